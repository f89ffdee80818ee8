//! Profile products (CloudSat and CALIPSO) rasterised into
//! `(ray, altitude)` images.

use crate::core::calibrate::{
    apply_scaling, calibrate_calipso, calibrate_cloudsat, mask_value, ratio, ProductVariable,
};
use crate::core::extent::{resolve_profile_extent, HorizontalExtent, TrackAxis};
use crate::core::interpolate::{GridInterpolator, InterpolationParams};
use crate::core::layermap::{layermap, LayerData};
use crate::io::product::{autodetect, swath_path, Dataset, ProductSource, CLOUDSAT_SWATH};
use crate::io::time::{parse_cloudsat_start_time, TimeEncoding};
use crate::types::{GridSpec, IndexWindow, PlotError, PlotResult, ProductKind, Raster};
use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Vertical area of influence of one profile bin (m)
pub const PROFILE_BIN_HEIGHT: f64 = 800.0;

/// Altitude range (m) used when neither the configuration nor the data
/// bound it
pub const DEFAULT_VERTICAL_EXTENT: (f64, f64) = (0.0, 20_000.0);

/// Layer count assumed when `Number_Layers_Found` carries no valid range
pub const DEFAULT_MAX_LAYERS: usize = 10;

/// Profile plot parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    pub hextent: HorizontalExtent,
    /// Altitude range in metres; non-finite bounds follow the data
    pub vextent: (f64, f64),
    /// Number of altitude cells
    pub resolution: usize,
    /// Vertical search radius in cells, derived from the bin height if unset
    pub radius: Option<i32>,
    pub fill: f32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            hextent: HorizontalExtent::None,
            vextent: (f64::NEG_INFINITY, f64::INFINITY),
            resolution: 1000,
            radius: None,
            fill: f32::NAN,
        }
    }
}

/// Rasterised profile window ready for rendering
#[derive(Debug, Clone)]
pub struct ProfileRaster {
    /// `(ray, altitude)`; column 0 is the bottom of the vertical extent
    pub data: Raster,
    /// `(x0, x1, y0, y1)`: rays relative to the window start, altitude in km
    pub extent: (f64, f64, f64, f64),
    pub window: IndexWindow,
    pub product: ProductKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Surface elevation (km) where the product provides it
    pub elevation: Option<Vec<f64>>,
    pub name: Option<String>,
}

enum Vertical {
    /// Altitude of each bin in metres, `(nray, nbin)`
    Bins(Array2<f32>),
    /// Layer boundaries in metres, `(nray, max_layers)`
    Layers {
        nlayer: Array1<u8>,
        base: Array2<f32>,
        top: Array2<f32>,
    },
}

impl Vertical {
    fn rows(&self, window: IndexWindow) -> Self {
        let r = window.range();
        match self {
            Vertical::Bins(h) => Vertical::Bins(h.slice(s![r, ..]).to_owned()),
            Vertical::Layers { nlayer, base, top } => Vertical::Layers {
                nlayer: nlayer.slice(s![r.clone()]).to_owned(),
                base: base.slice(s![r.clone(), ..]).to_owned(),
                top: top.slice(s![r, ..]).to_owned(),
            },
        }
    }

    /// Finite altitude range spanned by the data
    fn span(&self) -> Option<(f64, f64)> {
        let (lower, upper) = match self {
            Vertical::Bins(h) => (h, h),
            Vertical::Layers { base, top, .. } => (base, top),
        };
        let lo = lower.iter().filter(|v| v.is_finite()).fold(f32::INFINITY, |a, &b| a.min(b));
        let hi = upper.iter().filter(|v| v.is_finite()).fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        (lo <= hi).then(|| (lo as f64, hi as f64))
    }
}

struct Extracted {
    times: Vec<DateTime<Utc>>,
    lon: Vec<f64>,
    lat: Vec<f64>,
    data: Array2<f32>,
    vertical: Vertical,
    elevation: Option<Vec<f64>>,
    title: Option<String>,
    units: Option<String>,
}

/// Reads a variable of a profile product and grids the selected window
pub struct ProfileProcessor {
    config: PlotConfig,
}

impl ProfileProcessor {
    pub fn new(config: PlotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlotConfig {
        &self.config
    }

    /// Extract variable `what` from `product` and rasterise it.
    pub fn process<P: ProductSource + ?Sized>(&self, product: &P, what: &str) -> PlotResult<ProfileRaster> {
        let kind = autodetect(product);
        log::info!("Processing {} from {} product", what, kind);

        let variable = ProductVariable::lookup(what);
        let extracted = match kind {
            ProductKind::CloudSatProfile => read_cloudsat(product, &variable)?,
            ProductKind::CalipsoProfile => read_calipso_profile(product, &variable)?,
            ProductKind::CalipsoLayer => read_calipso_layer(product, &variable)?,
            ProductKind::ModisSwath | ProductKind::Unknown => {
                return Err(PlotError::InvalidFormat(format!(
                    "{} is not a profile product",
                    kind
                )))
            }
        };

        let nray = extracted.times.len();
        if extracted.lon.len() != nray || extracted.lat.len() != nray || extracted.data.nrows() != nray {
            return Err(PlotError::InvalidFormat(format!(
                "Along-track sizes differ: time {}, lon {}, lat {}, data {}",
                nray,
                extracted.lon.len(),
                extracted.lat.len(),
                extracted.data.nrows()
            )));
        }

        let track = TrackAxis {
            times: &extracted.times,
            lon: &extracted.lon,
            lat: &extracted.lat,
        };
        let window = resolve_profile_extent(&self.config.hextent, kind, &track)?;

        let data = extracted.data.slice(s![window.range(), ..]).to_owned();
        let vertical = extracted.vertical.rows(window);
        let (ve1, ve2) = self.vertical_extent(&vertical)?;
        let ygrid = GridSpec::new(ve1, ve2, self.config.resolution);

        let raster = match vertical {
            Vertical::Bins(heights) => {
                let params = InterpolationParams {
                    radius_x: 1,
                    radius_y: self.radius(ve1, ve2),
                    fill: self.config.fill,
                };
                GridInterpolator::with_params(params).interpolate_profiles(&data, &heights, ygrid)?
            }
            Vertical::Layers { nlayer, base, top } => {
                let layers = LayerData {
                    values: data,
                    nlayer,
                    base,
                    top,
                };
                layermap(&layers, ygrid, self.config.fill)?
            }
        };

        let r = window.range();
        Ok(ProfileRaster {
            data: raster,
            extent: (0.0, window.len() as f64, ve1 * 0.001, ve2 * 0.001),
            window,
            product: kind,
            start_time: extracted.times[window.start],
            end_time: extracted.times[window.end - 1],
            lon: extracted.lon[r.clone()].to_vec(),
            lat: extracted.lat[r.clone()].to_vec(),
            elevation: extracted.elevation.map(|e| e[r].to_vec()),
            name: ProductVariable::display_name(extracted.title.as_deref(), extracted.units.as_deref()),
        })
    }

    fn vertical_extent(&self, vertical: &Vertical) -> PlotResult<(f64, f64)> {
        let (v1, v2) = self.config.vextent;
        let span = if v1.is_finite() && v2.is_finite() {
            DEFAULT_VERTICAL_EXTENT
        } else {
            vertical.span().unwrap_or_else(|| {
                log::warn!("No valid altitudes in data, using {:?} m", DEFAULT_VERTICAL_EXTENT);
                DEFAULT_VERTICAL_EXTENT
            })
        };
        let ve1 = if v1.is_finite() { v1 } else { span.0 };
        let ve2 = if v2.is_finite() { v2 } else { span.1 };
        if ve1 >= ve2 {
            return Err(PlotError::InvalidExtent(format!(
                "Vertical extent {}..{} m is empty",
                ve1, ve2
            )));
        }
        Ok((ve1, ve2))
    }

    fn radius(&self, ve1: f64, ve2: f64) -> i32 {
        self.config.radius.unwrap_or_else(|| {
            ((PROFILE_BIN_HEIGHT * self.config.resolution as f64 / (ve2 - ve1)) as i32).max(1)
        })
    }
}

/// Calibrated data of `variable`, plus its title and units
fn read_variable<P, F>(
    product: &P,
    variable: &ProductVariable,
    path: impl Fn(&str) -> String,
    calibrate: F,
) -> PlotResult<(Array2<f32>, Option<String>, Option<String>)>
where
    P: ProductSource + ?Sized,
    F: Fn(&Dataset) -> PlotResult<Array2<f32>>,
{
    let mut arrays = Vec::with_capacity(variable.datasets.len());
    for name in &variable.datasets {
        arrays.push(calibrate(product.require(&path(name))?)?);
    }

    let mut data = if variable.is_ratio() {
        ratio(&arrays[1], &arrays[0])?
    } else {
        arrays.swap_remove(0)
    };
    if variable.offset.is_some() || variable.factor.is_some() {
        apply_scaling(&mut data, variable.offset, variable.factor)?;
    }

    let first = path(&variable.datasets[0]);
    let title = variable.title.clone().or_else(|| {
        if variable.is_ratio() {
            return None;
        }
        product
            .attribute(&first, "long_name")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| Some(variable.datasets[0].replace('_', " ")))
    });
    let units = variable.units.clone().or_else(|| {
        product
            .attribute(&first, "units")
            .and_then(|v| v.as_str().map(str::to_string))
    });

    Ok((data, title, units))
}

fn read_cloudsat<P: ProductSource + ?Sized>(product: &P, variable: &ProductVariable) -> PlotResult<Extracted> {
    let path = |name: &str| swath_path(CLOUDSAT_SWATH, name);

    let start_time = product
        .attribute(CLOUDSAT_SWATH, "start_time")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| PlotError::MissingField(format!("{}/start_time", CLOUDSAT_SWATH)))?;
    let encoding = TimeEncoding::CloudSat {
        start_time: parse_cloudsat_start_time(&start_time)?,
    };

    let times = encoding.decode_all(&product.require(&path("Profile_time"))?.first_column()?)?;
    let lon = product.require(&path("Longitude"))?.first_column()?;
    let lat = product.require(&path("Latitude"))?.first_column()?;

    let height_ds = product.require(&path("Height"))?;
    let mut heights = height_ds.to_array2()?;
    if let Some(fill) = height_ds.attribute("_FillValue").and_then(|v| v.as_f64()) {
        mask_value(&mut heights, fill);
    }

    let (data, title, units) = read_variable(product, variable, path, calibrate_cloudsat)?;
    if heights.dim() != data.dim() {
        return Err(PlotError::InvalidFormat(format!(
            "Height {:?} and data {:?} shapes differ",
            heights.dim(),
            data.dim()
        )));
    }

    Ok(Extracted {
        times,
        lon,
        lat,
        data,
        vertical: Vertical::Bins(heights),
        elevation: None,
        title,
        units,
    })
}

fn read_calipso_track<P: ProductSource + ?Sized>(
    product: &P,
) -> PlotResult<(Vec<DateTime<Utc>>, Vec<f64>, Vec<f64>)> {
    let times = TimeEncoding::Calipso.decode_all(&product.require("Profile_UTC_Time")?.first_column()?)?;
    let lon = product.require("Longitude")?.first_column()?;
    let lat = product.require("Latitude")?.first_column()?;
    Ok((times, lon, lat))
}

fn read_calipso_profile<P: ProductSource + ?Sized>(
    product: &P,
    variable: &ProductVariable,
) -> PlotResult<Extracted> {
    let (times, lon, lat) = read_calipso_track(product)?;
    let (data, title, units) = read_variable(product, variable, str::to_string, calibrate_calipso)?;

    let altitudes = product.require("metadata/Lidar_Data_Altitudes")?.to_array1()?;
    if altitudes.len() != data.ncols() {
        return Err(PlotError::InvalidFormat(format!(
            "{} altitudes for {} profile bins",
            altitudes.len(),
            data.ncols()
        )));
    }
    let row = altitudes.mapv(|km| (km * 1000.0) as f32);
    let heights = row
        .broadcast((data.nrows(), row.len()))
        .map(|v| v.to_owned())
        .ok_or_else(|| PlotError::Processing("Cannot broadcast altitudes".to_string()))?;

    let elevation = match product.dataset("Surface_Elevation") {
        Some(ds) => Some(ds.first_column()?),
        None => None,
    };

    Ok(Extracted {
        times,
        lon,
        lat,
        data,
        vertical: Vertical::Bins(heights),
        elevation,
        title,
        units,
    })
}

/// Upper bound of a `"min...max"` valid range attribute
fn parse_valid_range(text: &str) -> Option<usize> {
    text.split("...").nth(1)?.trim().parse().ok()
}

fn read_calipso_layer<P: ProductSource + ?Sized>(
    product: &P,
    variable: &ProductVariable,
) -> PlotResult<Extracted> {
    let (times, lon, lat) = read_calipso_track(product)?;
    let (data, title, units) = read_variable(product, variable, str::to_string, calibrate_calipso)?;

    let max_layers = match product
        .attribute("Number_Layers_Found", "valid_range")
        .and_then(|v| v.as_str().and_then(parse_valid_range))
    {
        Some(n) => n,
        None => {
            log::warn!(
                "Number_Layers_Found has no valid range, assuming {} layers",
                DEFAULT_MAX_LAYERS
            );
            DEFAULT_MAX_LAYERS
        }
    };
    let ncols = max_layers.min(data.ncols());

    let nlayer: Array1<u8> = product
        .require("Number_Layers_Found")?
        .first_column()?
        .into_iter()
        .map(|n| if n.is_finite() { n.clamp(0.0, ncols as f64) as u8 } else { 0 })
        .collect();

    let to_metres = |name: &str| -> PlotResult<Array2<f32>> {
        let km = calibrate_calipso(product.require(name)?)?;
        if km.nrows() != data.nrows() || km.ncols() < ncols {
            return Err(PlotError::InvalidFormat(format!(
                "{} has shape {:?}, expected {} rays with {} layers",
                name,
                km.dim(),
                data.nrows(),
                ncols
            )));
        }
        Ok(km.slice(s![.., ..ncols]).mapv(|v| v * 1000.0))
    };
    let base = to_metres("Layer_Base_Altitude")?;
    let top = to_metres("Layer_Top_Altitude")?;

    Ok(Extracted {
        times,
        lon,
        lat,
        data: data.slice(s![.., ..ncols]).to_owned(),
        vertical: Vertical::Layers { nlayer, base, top },
        elevation: None,
        title,
        units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::product::{AttributeValue, MemoryProduct};
    use crate::io::time::datetime_to_calipso_time;
    use chrono::{Duration, TimeZone};
    use ndarray::{ArrayD, IxDyn};

    fn dataset(shape: &[usize], values: Vec<f64>) -> Dataset {
        Dataset::new(ArrayD::from_shape_vec(IxDyn(shape), values).unwrap())
    }

    fn calipso_layer_product() -> MemoryProduct {
        let t0 = Utc.with_ymd_and_hms(2013, 4, 29, 12, 0, 0).unwrap();
        let times: Vec<f64> = (0..4)
            .map(|i| datetime_to_calipso_time(&(t0 + Duration::seconds(i))))
            .collect();
        MemoryProduct::new()
            .with_dataset("Profile_UTC_Time", dataset(&[4, 1], times))
            .with_dataset("Longitude", dataset(&[4, 1], vec![0.0, 0.1, 0.2, 0.3]))
            .with_dataset("Latitude", dataset(&[4, 1], vec![0.0, 0.1, 0.2, 0.3]))
            .with_dataset(
                "Number_Layers_Found",
                dataset(&[4, 1], vec![1.0, 2.0, 0.0, 1.0])
                    .with_attribute("valid_range", AttributeValue::Text("0...2".into())),
            )
            .with_dataset(
                "Layer_Base_Altitude",
                dataset(&[4, 2], vec![1.0, -9999.0, 1.0, 5.0, -9999.0, -9999.0, 2.0, -9999.0]),
            )
            .with_dataset(
                "Layer_Top_Altitude",
                dataset(&[4, 2], vec![3.0, -9999.0, 2.0, 8.0, -9999.0, -9999.0, 4.0, -9999.0]),
            )
            .with_dataset(
                "Midlayer_Temperature",
                dataset(&[4, 2], vec![0.0, -9999.0, 1.0, 2.0, -9999.0, -9999.0, 3.0, -9999.0]),
            )
    }

    #[test]
    fn test_layer_product() {
        let processor = ProfileProcessor::new(PlotConfig {
            vextent: (0.0, 10_000.0),
            resolution: 10,
            ..PlotConfig::default()
        });
        let raster = processor
            .process(&calipso_layer_product(), "calipso-temperature-layer")
            .unwrap();

        assert_eq!(raster.product, ProductKind::CalipsoLayer);
        // whole track minus the last ray
        assert_eq!(raster.window, IndexWindow { start: 0, end: 3 });
        assert_eq!(raster.data.dim(), (3, 10));
        assert_eq!(raster.extent, (0.0, 3.0, 0.0, 10.0));
        assert!((raster.data[[0, 1]] - 273.15).abs() < 1e-3);
        assert!((raster.data[[1, 6]] - 275.15).abs() < 1e-3);
        assert!(raster.data[[2, 1]].is_nan());
        assert_eq!(raster.name.as_deref(), Some("Midlayer Temperature (K)"));
    }

    #[test]
    fn test_masked_layers_are_rejected() {
        let product = calipso_layer_product().with_dataset(
            "Midlayer_Temperature",
            dataset(&[4, 2], vec![-9999.0; 8]),
        );
        let processor = ProfileProcessor::new(PlotConfig {
            vextent: (0.0, 10_000.0),
            resolution: 10,
            ..PlotConfig::default()
        });
        assert!(matches!(
            processor.process(&product, "Midlayer_Temperature"),
            Err(PlotError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_empty_vertical_extent() {
        let processor = ProfileProcessor::new(PlotConfig {
            vextent: (5000.0, 5000.0),
            ..PlotConfig::default()
        });
        assert!(matches!(
            processor.process(&calipso_layer_product(), "Midlayer_Temperature"),
            Err(PlotError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_valid_range() {
        assert_eq!(parse_valid_range("0...10"), Some(10));
        assert_eq!(parse_valid_range("0..10"), None);
    }

    #[test]
    fn test_auto_radius() {
        let processor = ProfileProcessor::new(PlotConfig {
            resolution: 100,
            ..PlotConfig::default()
        });
        assert_eq!(processor.radius(0.0, 20_000.0), 4);
        assert_eq!(processor.radius(0.0, 200_000.0), 1);
    }
}
