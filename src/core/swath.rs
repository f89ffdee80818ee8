//! MODIS L1B swaths: band calibration, geolocation reconstruction and
//! gridding onto a projected map raster.

use crate::core::dimmap::{dimmap_geolocation, DimensionMap};
use crate::core::extent::{resolve_swath_extent, HorizontalExtent};
use crate::core::interpolate::{GridInterpolator, InterpolationParams};
use crate::io::product::{swath_path, Dataset, ProductSource, MODIS_SWATH};
use crate::types::{GridSpec, IndexWindow, PlotError, PlotResult, Raster};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// Ground size of one earth-view data point (m)
pub const EV_DATAPOINT_SIZE: f64 = 2000.0;

/// Planck radiation constants: 2hc^2 (W m^2) and hc/k (m K)
const PLANCK_C1: f64 = 1.191e-16;
const PLANCK_C2: f64 = 1.439e-2;

/// Band centre wavelengths (nm) of bands 1-36
pub const MODIS_WAVELENGTHS: [f64; 36] = [
    645.0, 858.5, 469.0, 555.0, 1240.0, 1640.0, 2130.0, 412.5, 443.0, 488.0, 531.0, 551.0, 667.0,
    678.0, 748.0, 869.5, 905.0, 936.0, 940.0, 3750.0, 3959.0, 3959.0, 4050.0, 4465.5, 4515.5,
    1375.0, 6715.0, 7325.0, 8550.0, 9730.0, 11030.0, 12020.0, 13335.0, 13635.0, 13935.0, 14235.0,
];

/// Metres per degree at the equator, for converting footprints to
/// geographic map units
const METRES_PER_DEGREE_LON: f64 = 20_037_508.34 / 180.0;
const METRES_PER_DEGREE_LAT: f64 = 10_018_754.17 / 90.0;

/// Physical quantity derived from earth-view counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandMode {
    /// Emissive bands: brightness temperature (K)
    Radiance,
    /// Reflective bands: reflectance (%)
    Reflectance,
}

/// Earth-view dataset candidates and the band index within them
#[derive(Debug, Clone, PartialEq)]
pub struct BandSource {
    pub datasets: &'static [&'static str],
    pub index: usize,
}

/// Locate `band` (1-36, with 13.5 and 14.5 for the high-gain bands 13hi
/// and 14hi) in the L1B earth-view datasets.
pub fn band_source(band: f64) -> PlotResult<BandSource> {
    const REFSB_250: &[&str] = &["EV_250_RefSB", "EV_250_Aggr500_RefSB", "EV_250_Aggr1km_RefSB"];
    const REFSB_500: &[&str] = &["EV_500_RefSB", "EV_500_Aggr1km_RefSB"];
    const REFSB_1KM: &[&str] = &["EV_1KM_RefSB"];
    const EMISSIVE: &[&str] = &["EV_1KM_Emissive"];

    let unsupported = || PlotError::InvalidFormat(format!("Unsupported band {}", band));
    if band.fract() != 0.0 && band != 13.5 && band != 14.5 {
        return Err(unsupported());
    }

    let (datasets, index) = match band {
        b if (1.0..=2.0).contains(&b) => (REFSB_250, b as usize - 1),
        b if (3.0..=7.0).contains(&b) => (REFSB_500, b as usize - 3),
        // 8..12, 13lo, 13hi, 14lo, 14hi, 15..19
        b if (8.0..=13.0).contains(&b) => (REFSB_1KM, b as usize - 8),
        b if b == 13.5 => (REFSB_1KM, 6),
        b if b == 14.0 => (REFSB_1KM, 7),
        b if b == 14.5 => (REFSB_1KM, 8),
        b if (15.0..=19.0).contains(&b) => (REFSB_1KM, b as usize - 6),
        b if (20.0..=25.0).contains(&b) => (EMISSIVE, b as usize - 20),
        b if (27.0..=36.0).contains(&b) => (EMISSIVE, b as usize - 21),
        _ => return Err(unsupported()),
    };
    Ok(BandSource { datasets, index })
}

/// Centre wavelength of `band` in metres
pub fn band_wavelength(band: f64) -> Option<f64> {
    let i = band.trunc() as usize;
    (1..=36)
        .contains(&i)
        .then(|| MODIS_WAVELENGTHS[i - 1] * 1e-9)
}

/// Inverse Planck function: brightness temperature (K) of spectral
/// radiance `radiance` (W m^-2 sr^-1 um^-1) at `wavelength` (m).
pub fn brightness_temperature(radiance: f64, wavelength: f64) -> f64 {
    PLANCK_C2 / (wavelength * (PLANCK_C1 / (wavelength.powi(5) * radiance * 1e6) + 1.0).ln())
}

/// Swath gridding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwathConfig {
    pub band: f64,
    pub band_mode: BandMode,
    pub hextent: HorizontalExtent,
    /// Search radius in output cells, derived from the footprint if unset
    pub radius: Option<(i32, i32)>,
    pub fill: f32,
}

impl Default for SwathConfig {
    fn default() -> Self {
        Self {
            band: 31.0,
            band_mode: BandMode::Radiance,
            hextent: HorizontalExtent::None,
            radius: None,
            fill: f32::NAN,
        }
    }
}

/// Calibrated swath window at full resolution
#[derive(Debug, Clone)]
pub struct Swath {
    pub lon: Array2<f32>,
    pub lat: Array2<f32>,
    pub data: Array2<f32>,
    pub along: IndexWindow,
    pub across: IndexWindow,
    pub name: String,
}

fn scale_attribute(ds: &Dataset, name: &str, index: usize) -> PlotResult<f64> {
    ds.attribute(name)
        .and_then(|v| v.get(index))
        .ok_or_else(|| PlotError::MissingField(format!("{} [{}]", name, index)))
}

fn dimension_map<P: ProductSource + ?Sized>(
    product: &P,
    geo: &Dataset,
    data: &Dataset,
    axis: usize,
) -> PlotResult<DimensionMap> {
    let (geo_dim, data_dim) = match (geo.dims.get(axis), data.dims.get(axis + 1)) {
        (Some(g), Some(d)) => (g, d),
        _ => {
            return Err(PlotError::InvalidFormat(
                "Swath datasets carry no dimension names".to_string(),
            ))
        }
    };
    product
        .dimension_map(MODIS_SWATH, geo_dim, data_dim)
        .ok_or_else(|| PlotError::MissingField(format!("dimension map {}/{}", geo_dim, data_dim)))
}

/// Read band `config.band` of a MODIS L1B product: calibrate counts,
/// select the configured window and reconstruct its geolocation.
pub fn read_modis_swath<P: ProductSource + ?Sized>(product: &P, config: &SwathConfig) -> PlotResult<Swath> {
    let source = band_source(config.band)?;
    if config.band_mode == BandMode::Reflectance && config.band >= 20.0 {
        return Err(PlotError::InvalidFormat(format!(
            "Band {} is emissive, reflectance is not available",
            config.band
        )));
    }

    // The last candidate present has the finest resolution.
    let name = source
        .datasets
        .iter()
        .rev()
        .find(|name| product.contains(&swath_path(MODIS_SWATH, name)))
        .ok_or_else(|| PlotError::MissingField(source.datasets.join(" or ")))?;
    let ds = product.require(&swath_path(MODIS_SWATH, name))?;
    let counts = ds.to_array3()?;
    let (nband, nalong, nacross) = counts.dim();
    if source.index >= nband {
        return Err(PlotError::InvalidFormat(format!(
            "Band {} not present in {}",
            config.band, name
        )));
    }
    log::info!("Reading band {} from {} [{}]", config.band, name, source.index);

    let lon = product.require(&swath_path(MODIS_SWATH, "Longitude"))?;
    let lat = product.require(&swath_path(MODIS_SWATH, "Latitude"))?;
    let map_along = dimension_map(product, lon, ds, 0)?;
    let map_across = dimension_map(product, lon, ds, 1)?;

    let (along, across) = resolve_swath_extent(&config.hextent, nalong, nacross)?;

    let geo = dimmap_geolocation(
        &lon.to_array2()?,
        &lat.to_array2()?,
        (along.len(), map_along.starting_at(along.start)),
        (across.len(), map_across.starting_at(across.start)),
    )?;

    let (scale_name, offset_name) = match config.band_mode {
        BandMode::Radiance => ("radiance_scales", "radiance_offsets"),
        BandMode::Reflectance => ("reflectance_scales", "reflectance_offsets"),
    };
    let scale = scale_attribute(ds, scale_name, source.index)?;
    let offset = scale_attribute(ds, offset_name, source.index)?;

    let raw = counts.slice(s![source.index, along.range(), across.range()]);
    let data = match config.band_mode {
        BandMode::Radiance => {
            let wavelength = band_wavelength(config.band)
                .ok_or_else(|| PlotError::InvalidFormat(format!("Unsupported band {}", config.band)))?;
            raw.mapv(|c| {
                if c < 0.0 {
                    return f32::NAN;
                }
                brightness_temperature(scale * (c as f64 - offset), wavelength) as f32
            })
        }
        BandMode::Reflectance => raw.mapv(|c| {
            if c < 0.0 {
                return f32::NAN;
            }
            (scale * (c as f64 - offset) * 100.0) as f32
        }),
    };

    let name = match config.band_mode {
        BandMode::Radiance => format!("Band {:.1} Black Body Temperature (K)", config.band),
        BandMode::Reflectance => format!("Band {:.1} Albedo (%)", config.band),
    };

    Ok(Swath {
        lon: geo.lon,
        lat: geo.lat,
        data,
        along,
        across,
        name,
    })
}

/// Map projection from geographic to map coordinates
pub trait Projection: Send + Sync {
    /// `(x, y)` of a point, or `None` when it is not visible
    fn project(&self, lon: f64, lat: f64) -> Option<(f64, f64)>;

    /// Map units are degrees rather than metres
    fn is_geographic(&self) -> bool {
        false
    }
}

/// Equirectangular projection centred on `central_longitude`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlateCarree {
    pub central_longitude: f64,
}

impl Projection for PlateCarree {
    fn project(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let x = (lon - self.central_longitude + 180.0).rem_euclid(360.0) - 180.0;
        Some((x, lat))
    }

    fn is_geographic(&self) -> bool {
        true
    }
}

/// Gridded swath with its map extent `(x0, x1, y0, y1)`
#[derive(Debug, Clone)]
pub struct SwathRaster {
    pub data: Raster,
    pub extent: (f64, f64, f64, f64),
    pub name: String,
}

/// Projects a swath and interpolates it onto an `nx` x `ny` map raster
pub struct SwathGridder<'a> {
    projection: &'a dyn Projection,
    nx: usize,
    ny: usize,
}

impl<'a> SwathGridder<'a> {
    pub fn new(projection: &'a dyn Projection, nx: usize, ny: usize) -> Self {
        Self { projection, nx, ny }
    }

    /// Search radius covering one data point footprint, at least one cell
    pub fn footprint_radius(&self, extent: (f64, f64, f64, f64)) -> (i32, i32) {
        let (xfactor, yfactor) = if self.projection.is_geographic() {
            (METRES_PER_DEGREE_LON, METRES_PER_DEGREE_LAT)
        } else {
            (1.0, 1.0)
        };
        let cells = |size: f64, n: usize| {
            ((EV_DATAPOINT_SIZE / size * n as f64 + 0.5) as i32).max(1)
        };
        (
            cells((extent.1 - extent.0) * xfactor, self.nx),
            cells((extent.3 - extent.2) * yfactor, self.ny),
        )
    }

    /// Grid `swath` onto the map. Without an explicit `extent` the map
    /// covers the longitude/latitude box of `config.hextent`, or else the
    /// projected swath itself.
    pub fn grid(
        &self,
        swath: &Swath,
        config: &SwathConfig,
        extent: Option<(f64, f64, f64, f64)>,
    ) -> PlotResult<SwathRaster> {
        let mut x = Array2::from_elem(swath.data.dim(), f32::NAN);
        let mut y = Array2::from_elem(swath.data.dim(), f32::NAN);
        ndarray::Zip::from(&mut x)
            .and(&mut y)
            .and(&swath.lon)
            .and(&swath.lat)
            .for_each(|xv, yv, &lon, &lat| {
                if let Some((px, py)) = self.projection.project(lon as f64, lat as f64) {
                    *xv = px as f32;
                    *yv = py as f32;
                }
            });

        let extent = match (extent, &config.hextent) {
            (Some(e), _) => e,
            (None, HorizontalExtent::LonLat(bbox)) => self.box_extent(bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat)?,
            (None, _) => data_extent(&x, &y)?,
        };

        let (radius_x, radius_y) = config.radius.unwrap_or_else(|| self.footprint_radius(extent));
        log::debug!(
            "Gridding swath {:?} onto {}x{} over {:?}",
            swath.data.dim(),
            self.nx,
            self.ny,
            extent
        );

        let interpolator = GridInterpolator::with_params(InterpolationParams {
            radius_x,
            radius_y,
            fill: config.fill,
        });
        let data = interpolator.interpolate(
            &swath.data,
            &x,
            &y,
            GridSpec::new(extent.0, extent.1, self.nx),
            GridSpec::new(extent.2, extent.3, self.ny),
        )?;

        Ok(SwathRaster {
            data,
            extent,
            name: swath.name.clone(),
        })
    }

    fn box_extent(&self, lon0: f64, lon1: f64, lat0: f64, lat1: f64) -> PlotResult<(f64, f64, f64, f64)> {
        let corners = [(lon0, lat0), (lon0, lat1), (lon1, lat0), (lon1, lat1)];
        let mut e = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for (px, py) in corners.iter().filter_map(|(lon, lat)| self.projection.project(*lon, *lat)) {
            e = (e.0.min(px), e.1.max(px), e.2.min(py), e.3.max(py));
        }
        // the projection may wrap the eastern edge onto the western one
        if self.projection.is_geographic() && e.1 <= e.0 {
            e.1 = e.0 + (lon1 - lon0);
        }
        if !(e.0 < e.1 && e.2 < e.3) {
            return Err(PlotError::InvalidExtent(format!(
                "Map box {}..{}, {}..{} projects to an empty extent",
                lon0, lon1, lat0, lat1
            )));
        }
        Ok(e)
    }
}

fn data_extent(x: &Array2<f32>, y: &Array2<f32>) -> PlotResult<(f64, f64, f64, f64)> {
    let range = |a: &Array2<f32>| {
        a.iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v as f64), hi.max(v as f64))
            })
    };
    let (x0, x1) = range(x);
    let (y0, y1) = range(y);
    if !(x0 < x1 && y0 < y1) {
        return Err(PlotError::InvalidExtent(
            "Swath has no visible extent".to_string(),
        ));
    }
    Ok((x0, x1, y0, y1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_source() {
        assert_eq!(band_source(1.0).unwrap().index, 0);
        assert_eq!(band_source(7.0).unwrap().index, 4);
        assert_eq!(band_source(13.0).unwrap().index, 5);
        assert_eq!(band_source(13.5).unwrap().index, 6);
        assert_eq!(band_source(14.5).unwrap().index, 8);
        assert_eq!(band_source(19.0).unwrap().index, 13);
        assert_eq!(band_source(25.0).unwrap().index, 5);
        assert_eq!(band_source(31.0).unwrap(), BandSource { datasets: &["EV_1KM_Emissive"], index: 10 });
        assert!(band_source(26.0).is_err());
        assert!(band_source(12.5).is_err());
        assert!(band_source(37.0).is_err());
    }

    #[test]
    fn test_brightness_temperature() {
        // 11 um radiance of a ~300 K black body
        let lambda = band_wavelength(31.0).unwrap();
        let t = brightness_temperature(9.6, lambda);
        assert!(t > 295.0 && t < 305.0, "temperature {}", t);
        assert_relative_eq!(band_wavelength(13.5).unwrap(), 667e-9, epsilon = 1e-15);
    }

    #[test]
    fn test_plate_carree_wraps() {
        let p = PlateCarree { central_longitude: 180.0 };
        let (x, y) = p.project(-170.0, 10.0).unwrap();
        assert_relative_eq!(x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(y, 10.0);
        assert!(p.project(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_footprint_radius() {
        let p = PlateCarree::default();
        let gridder = SwathGridder::new(&p, 1000, 500);
        let (rx, ry) = gridder.footprint_radius((0.0, 10.0, 0.0, 10.0));
        assert_eq!((rx, ry), (2, 1));
    }
}
