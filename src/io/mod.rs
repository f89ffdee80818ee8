//! Product access, mission time encodings and colormap files

pub mod product;
pub mod time;
pub mod colormap;

pub use product::{autodetect, AttributeValue, Dataset, MemoryProduct, ProductSource};
pub use time::TimeEncoding;
pub use colormap::{Colormap, ColormapLoader, ColorScale, Rgba};
