//! ccplot: gridding and plotting support for CloudSat, CALIPSO and
//! Aqua MODIS products
//!
//! This library turns along-track profiles and cross-track swaths into
//! regular rasters ready for rendering: it reconstructs full-resolution
//! geolocation from tie points, interpolates scattered samples onto
//! image grids, resolves user extents into array windows, decodes
//! mission time encodings and reads colormap tables.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{GridSpec, IndexWindow, LonLatBox, PlotError, PlotResult, ProductKind, Raster};

pub use crate::core::{
    dimmap, dimmap2d, dimmap_geolocation, layermap, DimensionMap, GridInterpolator,
    HorizontalExtent, PlotConfig, ProfileProcessor, SwathConfig, SwathGridder,
};
pub use crate::io::{autodetect, Colormap, ColormapLoader, MemoryProduct, ProductSource};
