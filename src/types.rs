use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Rasterised sample grid handed to the renderer (NaN = no data)
pub type Raster = Array2<f32>;

/// One output raster axis: `n` cells spanning `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl GridSpec {
    pub fn new(min: f64, max: f64, n: usize) -> Self {
        Self { min, max, n }
    }

    /// Width of one cell in axis units
    pub fn cell_size(&self) -> f64 {
        (self.max - self.min) / self.n as f64
    }

    /// Continuous cell position of an axis coordinate
    pub fn position(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min) * self.n as f64
    }

    /// Axis coordinate of the lower edge of cell `i`
    pub fn coordinate(&self, i: usize) -> f64 {
        self.min + i as f64 * self.cell_size()
    }

    pub(crate) fn validate(&self, axis: &str) -> PlotResult<()> {
        if !(self.max > self.min) || !self.min.is_finite() || !self.max.is_finite() {
            return Err(PlotError::InvalidExtent(format!(
                "{} axis range {}..{} is empty",
                axis, self.min, self.max
            )));
        }
        if self.n == 0 {
            return Err(PlotError::InvalidExtent(format!(
                "{} axis has zero resolution",
                axis
            )));
        }
        Ok(())
    }
}

/// Longitude/latitude box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLatBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl LonLatBox {
    /// Builds a box from two corner pairs, clamping to the valid globe and
    /// ordering each pair ascending.
    pub fn new(lon: (f64, f64), lat: (f64, f64)) -> Self {
        let clamp_lon = |v: f64| v.clamp(-180.0, 180.0);
        let clamp_lat = |v: f64| v.clamp(-90.0, 90.0);
        let (lon0, lon1) = (clamp_lon(lon.0), clamp_lon(lon.1));
        let (lat0, lat1) = (clamp_lat(lat.0), clamp_lat(lat.1));
        Self {
            min_lon: lon0.min(lon1),
            max_lon: lon0.max(lon1),
            min_lat: lat0.min(lat1),
            max_lat: lat0.max(lat1),
        }
    }

    /// Strict containment test (points on the border are outside)
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon > self.min_lon && lon < self.max_lon && lat > self.min_lat && lat < self.max_lat
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

impl Default for LonLatBox {
    fn default() -> Self {
        Self {
            min_lon: -180.0,
            max_lon: 180.0,
            min_lat: -90.0,
            max_lat: 90.0,
        }
    }
}

/// Resolved half-open index window `start..end` into an array axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWindow {
    pub start: usize,
    pub end: usize,
}

impl IndexWindow {
    /// Checks `0 <= start < end <= len`
    pub fn new(start: usize, end: usize, len: usize) -> PlotResult<Self> {
        if start >= end || end > len {
            return Err(PlotError::InvalidExtent(format!(
                "index window {}..{} is invalid for axis of length {}",
                start, end, len
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Product types recognised by feature detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    /// CloudSat 2B-GEOPROF radar profiles
    CloudSatProfile,
    /// CALIPSO lidar profile products (L1B and L2 profile)
    CalipsoProfile,
    /// CALIPSO layer products
    CalipsoLayer,
    /// Aqua MODIS L1B earth view swath
    ModisSwath,
    Unknown,
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductKind::CloudSatProfile => write!(f, "cloudsat-2b-geoprof"),
            ProductKind::CalipsoProfile => write!(f, "calipso-profile"),
            ProductKind::CalipsoLayer => write!(f, "calipso-layer"),
            ProductKind::ModisSwath => write!(f, "modis-swath-l1b"),
            ProductKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error types for gridding and colormap handling
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Extent type {extent} not supported by {product} products")]
    UnsupportedExtent { extent: String, product: ProductKind },

    #[error("Invalid interpolation radius: rx={radius_x}, ry={radius_y}")]
    InvalidRadius { radius_x: i32, radius_y: i32 },

    #[error("Error reading `{source_name}' on line {line}: {reason}")]
    MalformedColormap {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Field \"{0}\" not found")]
    MissingField(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for gridding operations
pub type PlotResult<T> = Result<T, PlotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_window_bounds() {
        assert!(IndexWindow::new(0, 10, 10).is_ok());
        assert!(IndexWindow::new(5, 5, 10).is_err());
        assert!(IndexWindow::new(3, 11, 10).is_err());
        assert_eq!(IndexWindow::new(2, 7, 10).unwrap().len(), 5);
    }

    #[test]
    fn test_lonlat_box_ordering() {
        let bbox = LonLatBox::new((20.0, -200.0), (95.0, 10.0));
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 20.0);
        assert_eq!(bbox.min_lat, 10.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert!(bbox.contains(0.0, 45.0));
        assert!(!bbox.contains(20.0, 45.0));
    }

    #[test]
    fn test_grid_spec_position() {
        let grid = GridSpec::new(-10.0, 10.0, 40);
        assert!((grid.cell_size() - 0.5).abs() < 1e-12);
        assert!((grid.position(grid.coordinate(7)) - 7.0).abs() < 1e-9);
        assert!(GridSpec::new(1.0, 1.0, 5).validate("x").is_err());
        assert!(GridSpec::new(0.0, 1.0, 0).validate("y").is_err());
    }
}
