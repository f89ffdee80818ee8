//! Gridding, extent resolution and product pipelines

pub mod dimmap;
pub mod interpolate;
pub mod layermap;
pub mod extent;
pub mod calibrate;
pub mod profile;
pub mod swath;

// Re-export main types
pub use dimmap::{dimmap, dimmap2d, dimmap_geolocation, DimensionMap, Geolocation};
pub use interpolate::{GridInterpolator, InterpolationParams};
pub use layermap::{layermap, LayerData};
pub use extent::{lonlat_to_ray, norm_index, time_to_ray, HorizontalExtent, TimeTarget, TrackAxis};
pub use calibrate::ProductVariable;
pub use profile::{PlotConfig, ProfileProcessor, ProfileRaster};
pub use swath::{read_modis_swath, BandMode, PlateCarree, Projection, Swath, SwathConfig, SwathGridder, SwathRaster};
