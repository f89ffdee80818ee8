use crate::io::product::Dataset;
use crate::types::{PlotError, PlotResult};
use ndarray::Array2;

/// Missing-value marker used throughout CALIPSO products
pub const CALIPSO_FILL_VALUE: f64 = -9999.0;

/// Explicitly supported profile and layer variables
struct KnownVariable {
    name: &'static str,
    title: Option<&'static str>,
    units: Option<&'static str>,
    datasets: &'static [&'static str],
    offset: Option<f64>,
}

const KNOWN_VARIABLES: &[KnownVariable] = &[
    KnownVariable {
        name: "cloudsat-reflec",
        title: None,
        units: None,
        datasets: &["Radar_Reflectivity"],
        offset: None,
    },
    KnownVariable {
        name: "calipso532",
        title: Some("Total Attenuated Backscatter 532nm"),
        units: Some("km-1 sr-1"),
        datasets: &["Total_Attenuated_Backscatter_532"],
        offset: None,
    },
    KnownVariable {
        name: "calipso532p",
        title: Some("Perpendicular Attenuated Backscatter 532nm"),
        units: Some("km-1 sr-1"),
        datasets: &["Perpendicular_Attenuated_Backscatter_532"],
        offset: None,
    },
    KnownVariable {
        name: "calipso1064",
        title: Some("Attenuated Backscatter 1064nm"),
        units: Some("km-1 sr-1"),
        datasets: &["Attenuated_Backscatter_1064"],
        offset: None,
    },
    KnownVariable {
        name: "calipso-cratio",
        title: Some("Attenuated Color Ratio 1064nm/532nm"),
        units: None,
        datasets: &["Total_Attenuated_Backscatter_532", "Attenuated_Backscatter_1064"],
        offset: None,
    },
    KnownVariable {
        name: "calipso-dratio",
        title: Some("Depolarization Ratio"),
        units: None,
        datasets: &[
            "Total_Attenuated_Backscatter_532",
            "Perpendicular_Attenuated_Backscatter_532",
        ],
        offset: None,
    },
    KnownVariable {
        name: "calipso532-layer",
        title: Some("Integrated Attenuated Backscatter 532nm"),
        units: Some("sr-1"),
        datasets: &["Integrated_Attenuated_Backscatter_532"],
        offset: None,
    },
    KnownVariable {
        name: "calipso1064-layer",
        title: Some("Integrated Attenuated Backscatter 1064nm"),
        units: Some("sr-1"),
        datasets: &["Integrated_Attenuated_Backscatter_1064"],
        offset: None,
    },
    KnownVariable {
        name: "calipso-cratio-layer",
        title: Some("Integrated Attenuated Total Color Ratio 1064nm/532nm"),
        units: None,
        datasets: &["Integrated_Attenuated_Total_Color_Ratio"],
        offset: None,
    },
    KnownVariable {
        name: "calipso-dratio-layer",
        title: Some("Integrated Volume Depolarization Ratio"),
        units: None,
        datasets: &["Integrated_Volume_Depolarization_Ratio"],
        offset: None,
    },
    KnownVariable {
        name: "calipso-temperature-layer",
        title: Some("Midlayer Temperature"),
        units: Some("K"),
        datasets: &["Midlayer_Temperature"],
        offset: Some(-273.15),
    },
];

/// What to plot: one dataset, or the ratio of two
#[derive(Debug, Clone, PartialEq)]
pub struct ProductVariable {
    pub name: String,
    pub title: Option<String>,
    pub units: Option<String>,
    pub datasets: Vec<String>,
    pub offset: Option<f64>,
    pub factor: Option<f64>,
}

impl ProductVariable {
    /// Known variable by name, otherwise `name` taken as a dataset name
    pub fn lookup(name: &str) -> Self {
        match KNOWN_VARIABLES.iter().find(|v| v.name == name) {
            Some(v) => Self {
                name: v.name.to_string(),
                title: v.title.map(str::to_string),
                units: v.units.map(str::to_string),
                datasets: v.datasets.iter().map(|d| d.to_string()).collect(),
                offset: v.offset,
                factor: None,
            },
            None => Self {
                name: name.to_string(),
                title: None,
                units: None,
                datasets: vec![name.to_string()],
                offset: None,
                factor: None,
            },
        }
    }

    /// Ratio variables divide the second dataset by the first
    pub fn is_ratio(&self) -> bool {
        self.datasets.len() == 2
    }

    /// `title (units)`, or the bare title
    pub fn display_name(title: Option<&str>, units: Option<&str>) -> Option<String> {
        match (title, units) {
            (Some(t), Some(u)) => Some(format!("{} ({})", t, u)),
            (Some(t), None) => Some(t.to_string()),
            _ => None,
        }
    }
}

/// Replace every element equal to `value` (at f32 precision) by NaN
pub fn mask_value(data: &mut Array2<f32>, value: f64) {
    let target = value as f32;
    data.mapv_inplace(|v| if v == target { f32::NAN } else { v });
}

/// `(v - offset) / factor`
pub fn apply_scaling(data: &mut Array2<f32>, offset: Option<f64>, factor: Option<f64>) -> PlotResult<()> {
    if let Some(factor) = factor {
        if factor == 0.0 || !factor.is_finite() {
            return Err(PlotError::InvalidFormat(format!(
                "Invalid scale factor {}",
                factor
            )));
        }
    }
    let offset = offset.unwrap_or(0.0) as f32;
    let inverse = (1.0 / factor.unwrap_or(1.0)) as f32;
    data.mapv_inplace(|v| (v - offset) * inverse);
    Ok(())
}

fn attribute_f64(ds: &Dataset, name: &str) -> Option<f64> {
    ds.attribute(name).and_then(|v| v.as_f64())
}

/// CloudSat: mask `_FillValue` and `missing`, then undo `factor`/`offset`.
pub fn calibrate_cloudsat(ds: &Dataset) -> PlotResult<Array2<f32>> {
    let mut data = ds.to_array2()?;
    for name in ["_FillValue", "missing"] {
        if let Some(fill) = attribute_f64(ds, name) {
            mask_value(&mut data, fill);
        }
    }
    apply_scaling(&mut data, attribute_f64(ds, "offset"), attribute_f64(ds, "factor"))?;
    Ok(data)
}

/// CALIPSO: mask the product-wide `-9999` and a dataset `fillvalue`.
pub fn calibrate_calipso(ds: &Dataset) -> PlotResult<Array2<f32>> {
    let mut data = ds.to_array2()?;
    mask_value(&mut data, CALIPSO_FILL_VALUE);
    if let Some(fill) = attribute_f64(ds, "fillvalue") {
        mask_value(&mut data, fill);
    }
    Ok(data)
}

/// Elementwise `numerator / denominator`, used for color and
/// depolarisation ratios.
pub fn ratio(numerator: &Array2<f32>, denominator: &Array2<f32>) -> PlotResult<Array2<f32>> {
    if numerator.dim() != denominator.dim() {
        return Err(PlotError::InvalidFormat(format!(
            "Ratio datasets differ in shape: {:?} vs {:?}",
            numerator.dim(),
            denominator.dim()
        )));
    }
    Ok(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::product::AttributeValue;
    use ndarray::{array, ArrayD, IxDyn};

    #[test]
    fn test_cloudsat_calibration() {
        let ds = Dataset::new(ArrayD::from_shape_vec(IxDyn(&[1, 4]), vec![-8888.0, 1500.0, -2500.0, 0.0]).unwrap())
            .with_attribute("_FillValue", AttributeValue::Number(-8888.0))
            .with_attribute("missing", AttributeValue::Number(0.0))
            .with_attribute("factor", AttributeValue::Number(100.0));

        let data = calibrate_cloudsat(&ds).unwrap();
        assert!(data[[0, 0]].is_nan());
        assert!((data[[0, 1]] - 15.0).abs() < 1e-5);
        assert!((data[[0, 2]] + 25.0).abs() < 1e-5);
        assert!(data[[0, 3]].is_nan());
    }

    #[test]
    fn test_calipso_masking() {
        let ds = Dataset::new(ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![-9999.0, 0.5]).unwrap());
        let data = calibrate_calipso(&ds).unwrap();
        assert!(data[[0, 0]].is_nan());
        assert_eq!(data[[1, 0]], 0.5);
    }

    #[test]
    fn test_variable_lookup() {
        let v = ProductVariable::lookup("calipso-dratio");
        assert!(v.is_ratio());
        let v = ProductVariable::lookup("calipso-temperature-layer");
        assert_eq!(v.offset, Some(-273.15));
        let v = ProductVariable::lookup("Cloud_Mask");
        assert_eq!(v.datasets, vec!["Cloud_Mask".to_string()]);
        assert_eq!(
            ProductVariable::display_name(Some("Midlayer Temperature"), Some("K")).as_deref(),
            Some("Midlayer Temperature (K)")
        );
    }

    #[test]
    fn test_scaling_rejects_zero_factor() {
        let mut data = array![[1.0f32]];
        assert!(apply_scaling(&mut data, None, Some(0.0)).is_err());
        apply_scaling(&mut data, Some(-273.15), None).unwrap();
        assert!((data[[0, 0]] - 274.15).abs() < 1e-3);
    }
}
