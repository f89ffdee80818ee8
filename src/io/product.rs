use crate::core::dimmap::DimensionMap;
use crate::types::{PlotError, PlotResult, ProductKind};
use ndarray::{Array1, Array2, Array3, ArrayD, Axis, Ix1, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CloudSat 2B-GEOPROF swath name
pub const CLOUDSAT_SWATH: &str = "2B-GEOPROF";
/// MODIS L1B swath name
pub const MODIS_SWATH: &str = "MODIS_SWATH_Type_L1B";

/// Scalar, array or string attribute attached to a dataset or group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

impl AttributeValue {
    /// Scalar value (first element of an array, or a numeric string)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Numbers(v) => v.first().copied(),
            AttributeValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Element `i` of an array attribute
    pub fn get(&self, i: usize) -> Option<f64> {
        match self {
            AttributeValue::Numbers(v) => v.get(i).copied(),
            AttributeValue::Number(v) if i == 0 => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Named multidimensional dataset as exposed by a product reader
#[derive(Debug, Clone)]
pub struct Dataset {
    pub values: ArrayD<f64>,
    /// Dimension names, used to look up swath dimension maps
    pub dims: Vec<String>,
    pub attributes: HashMap<String, AttributeValue>,
}

impl Dataset {
    pub fn new(values: ArrayD<f64>) -> Self {
        Self {
            values,
            dims: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_dims(mut self, dims: &[&str]) -> Self {
        self.dims = dims.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn to_array1(&self) -> PlotResult<Array1<f64>> {
        self.values
            .view()
            .into_dimensionality::<Ix1>()
            .map(|v| v.to_owned())
            .map_err(|_| self.shape_error(1))
    }

    pub fn to_array2(&self) -> PlotResult<Array2<f32>> {
        self.values
            .view()
            .into_dimensionality::<Ix2>()
            .map(|v| v.mapv(|x| x as f32))
            .map_err(|_| self.shape_error(2))
    }

    pub fn to_array3(&self) -> PlotResult<Array3<f32>> {
        self.values
            .view()
            .into_dimensionality::<Ix3>()
            .map(|v| v.mapv(|x| x as f32))
            .map_err(|_| self.shape_error(3))
    }

    /// Per-ray vector: the dataset itself if 1-D, its first column if 2-D
    pub fn first_column(&self) -> PlotResult<Vec<f64>> {
        match self.values.ndim() {
            1 => Ok(self.values.iter().copied().collect()),
            2 => Ok(self.values.index_axis(Axis(1), 0).iter().copied().collect()),
            _ => Err(self.shape_error(2)),
        }
    }

    fn shape_error(&self, expected: usize) -> PlotError {
        PlotError::InvalidFormat(format!(
            "Dataset has shape {:?}, expected {} dimensions",
            self.shape(),
            expected
        ))
    }
}

/// Typed accessor over an HDF-EOS/HDF4 product.
///
/// Paths use `/` to separate a swath or group from a dataset name,
/// e.g. `2B-GEOPROF/Profile_time` or `metadata/Lidar_Data_Altitudes`.
pub trait ProductSource {
    /// Dataset at `path`, if present
    fn dataset(&self, path: &str) -> Option<&Dataset>;

    /// Attribute `name` of the dataset or group at `path`
    fn attribute(&self, path: &str, name: &str) -> Option<AttributeValue>;

    /// Dimension map between a geolocation and a data dimension of a swath
    fn dimension_map(&self, swath: &str, geo_dim: &str, data_dim: &str) -> Option<DimensionMap>;

    fn contains(&self, path: &str) -> bool {
        self.dataset(path).is_some()
    }

    /// Dataset at `path`, or `MissingField`
    fn require(&self, path: &str) -> PlotResult<&Dataset> {
        self.dataset(path)
            .ok_or_else(|| PlotError::MissingField(path.to_string()))
    }
}

/// Product held entirely in memory, filled by an external reader or a test
#[derive(Debug, Clone, Default)]
pub struct MemoryProduct {
    datasets: HashMap<String, Dataset>,
    group_attributes: HashMap<String, HashMap<String, AttributeValue>>,
    dimension_maps: HashMap<(String, String, String), DimensionMap>,
}

impl MemoryProduct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_dataset(&mut self, path: &str, dataset: Dataset) {
        self.datasets.insert(path.to_string(), dataset);
    }

    pub fn with_dataset(mut self, path: &str, dataset: Dataset) -> Self {
        self.insert_dataset(path, dataset);
        self
    }

    pub fn with_group_attribute(mut self, group: &str, name: &str, value: AttributeValue) -> Self {
        self.group_attributes
            .entry(group.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    pub fn with_dimension_map(mut self, swath: &str, geo_dim: &str, data_dim: &str, map: DimensionMap) -> Self {
        self.dimension_maps.insert(
            (swath.to_string(), geo_dim.to_string(), data_dim.to_string()),
            map,
        );
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(|k| k.as_str())
    }
}

impl ProductSource for MemoryProduct {
    fn dataset(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(path)
    }

    fn attribute(&self, path: &str, name: &str) -> Option<AttributeValue> {
        if let Some(value) = self.datasets.get(path).and_then(|d| d.attributes.get(name)) {
            return Some(value.clone());
        }
        self.group_attributes
            .get(path)
            .and_then(|attrs| attrs.get(name))
            .cloned()
    }

    fn dimension_map(&self, swath: &str, geo_dim: &str, data_dim: &str) -> Option<DimensionMap> {
        self.dimension_maps
            .get(&(swath.to_string(), geo_dim.to_string(), data_dim.to_string()))
            .copied()
    }
}

/// Path of a dataset inside a swath
pub fn swath_path(swath: &str, name: &str) -> String {
    format!("{}/{}", swath, name)
}

/// Recognise the product type by the datasets it carries.
pub fn autodetect<P: ProductSource + ?Sized>(product: &P) -> ProductKind {
    if product.contains("Longitude") && product.contains("Latitude") {
        let layer = ["Layer_Base_Altitude", "Layer_Top_Altitude", "Number_Layers_Found"];
        if layer.iter().all(|name| product.contains(name)) {
            return ProductKind::CalipsoLayer;
        }
        if product.contains("metadata/Lidar_Data_Altitudes") {
            return ProductKind::CalipsoProfile;
        }
    }

    let cloudsat = ["Profile_time", "Latitude", "Longitude", "Height"];
    if cloudsat
        .iter()
        .all(|name| product.contains(&swath_path(CLOUDSAT_SWATH, name)))
    {
        return ProductKind::CloudSatProfile;
    }

    if product.contains(&swath_path(MODIS_SWATH, "Latitude"))
        && product.contains(&swath_path(MODIS_SWATH, "Longitude"))
    {
        return ProductKind::ModisSwath;
    }

    log::debug!("Product type not recognised");
    ProductKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn zeros(shape: &[usize]) -> Dataset {
        Dataset::new(ArrayD::zeros(IxDyn(shape)))
    }

    #[test]
    fn test_autodetect_calipso() {
        let profile = MemoryProduct::new()
            .with_dataset("Latitude", zeros(&[4, 1]))
            .with_dataset("Longitude", zeros(&[4, 1]))
            .with_dataset("metadata/Lidar_Data_Altitudes", zeros(&[10]));
        assert_eq!(autodetect(&profile), ProductKind::CalipsoProfile);

        let layer = profile
            .with_dataset("Layer_Base_Altitude", zeros(&[4, 5]))
            .with_dataset("Layer_Top_Altitude", zeros(&[4, 5]))
            .with_dataset("Number_Layers_Found", zeros(&[4, 1]));
        assert_eq!(autodetect(&layer), ProductKind::CalipsoLayer);
    }

    #[test]
    fn test_autodetect_cloudsat_and_modis() {
        let mut cloudsat = MemoryProduct::new();
        for name in ["Profile_time", "Latitude", "Longitude"] {
            cloudsat.insert_dataset(&swath_path(CLOUDSAT_SWATH, name), zeros(&[4]));
        }
        assert_eq!(autodetect(&cloudsat), ProductKind::Unknown);
        cloudsat.insert_dataset(&swath_path(CLOUDSAT_SWATH, "Height"), zeros(&[4, 3]));
        assert_eq!(autodetect(&cloudsat), ProductKind::CloudSatProfile);

        let modis = MemoryProduct::new()
            .with_dataset(&swath_path(MODIS_SWATH, "Latitude"), zeros(&[2, 2]))
            .with_dataset(&swath_path(MODIS_SWATH, "Longitude"), zeros(&[2, 2]));
        assert_eq!(autodetect(&modis), ProductKind::ModisSwath);
    }

    #[test]
    fn test_attribute_lookup() {
        let product = MemoryProduct::new()
            .with_dataset(
                "A",
                zeros(&[1]).with_attribute("factor", AttributeValue::Number(100.0)),
            )
            .with_group_attribute("2B-GEOPROF", "start_time", AttributeValue::Text("20130429200420".into()));

        assert_eq!(product.attribute("A", "factor").and_then(|v| v.as_f64()), Some(100.0));
        assert_eq!(
            product.attribute("2B-GEOPROF", "start_time").as_ref().and_then(|v| v.as_str()),
            Some("20130429200420")
        );
        assert!(product.attribute("A", "offset").is_none());
        assert!(matches!(product.require("B"), Err(PlotError::MissingField(_))));
    }

    #[test]
    fn test_first_column() {
        let ds = Dataset::new(ArrayD::from_shape_vec(IxDyn(&[3, 2]), vec![1.0, 9.0, 2.0, 9.0, 3.0, 9.0]).unwrap());
        assert_eq!(ds.first_column().unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(ds.to_array3().is_err());
    }
}
