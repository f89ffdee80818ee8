//! Colormap table files.
//!
//! The format is line oriented with four section headers:
//!
//! ```text
//! BOUNDS
//! from to step
//! TICKS
//! from to step
//! COLORS
//! r g b [a]
//! UNDER_OVER_BAD_COLORS
//! r g b [a]
//! ```
//!
//! `from to step` lines expand to the half-open arithmetic range
//! `from, from+step, ... < to`. Color components are base-10 integers in
//! `0..=255`; alpha defaults to opaque. Blank lines are ignored and lines
//! before the first header belong to `COLORS`.

use crate::types::{PlotError, PlotResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 8-bit RGBA color
pub type Rgba = [u8; 4];

pub const OPAQUE_WHITE: Rgba = [255, 255, 255, 255];

/// Extension tried when a colormap is looked up by bare name
pub const COLORMAP_EXTENSION: &str = "cmap";

/// Parsed colormap table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Colormap {
    pub colors: Vec<Rgba>,
    pub bounds: Vec<f64>,
    pub ticks: Vec<f64>,
    pub under: Rgba,
    pub over: Rgba,
    pub bad: Rgba,
}

/// How a renderer should map values to colors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorScale<'a> {
    /// Discrete bands: `colors[i]` covers `bounds[i]..bounds[i + 1]`
    Boundaries { bounds: &'a [f64], colors: &'a [Rgba] },
    /// Plain color list spread over the data range
    Listed { colors: &'a [Rgba] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Bounds,
    Ticks,
    Colors,
    UnderOverBad,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "BOUNDS" => Some(Section::Bounds),
            "TICKS" => Some(Section::Ticks),
            "COLORS" => Some(Section::Colors),
            "UNDER_OVER_BAD_COLORS" => Some(Section::UnderOverBad),
            _ => None,
        }
    }
}

/// Half-open arithmetic range `from..to` with the given step.
///
/// Non-finite inputs, a zero step or a step pointing away from `to`
/// produce an empty range.
pub fn arange(from: f64, to: f64, step: f64) -> Vec<f64> {
    if !from.is_finite() || !to.is_finite() || !step.is_finite() || step == 0.0 {
        return Vec::new();
    }
    let n = ((to - from) / step).ceil();
    if !(n > 0.0) {
        return Vec::new();
    }
    (0..n as usize).map(|i| from + i as f64 * step).collect()
}

/// `from to step`; a fourth field is ignored.
fn parse_range(fields: &[&str]) -> Result<Vec<f64>, String> {
    let mut v = [0.0f64; 3];
    for (slot, field) in v.iter_mut().zip(fields) {
        *slot = field
            .parse()
            .map_err(|_| format!("Invalid number \"{}\"", field))?;
    }
    Ok(arange(v[0], v[1], v[2]))
}

fn parse_color(fields: &[&str]) -> Result<Rgba, String> {
    let mut rgba = OPAQUE_WHITE;
    for (slot, field) in rgba.iter_mut().zip(fields) {
        let value: i64 = field
            .parse()
            .map_err(|_| format!("Invalid color component \"{}\"", field))?;
        *slot = u8::try_from(value)
            .map_err(|_| format!("Color component {} out of range 0-255", value))?;
    }
    Ok(rgba)
}

impl Colormap {
    /// Parse colormap text; `source_name` is used in error messages.
    pub fn parse(text: &str, source_name: &str) -> PlotResult<Self> {
        let mut bounds = Vec::new();
        let mut ticks = Vec::new();
        let mut colors = Vec::new();
        let mut special = Vec::new();
        let mut section = Section::Colors;

        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(s) = Section::from_header(line) {
                section = s;
                continue;
            }

            let malformed = |reason: String| PlotError::MalformedColormap {
                source_name: source_name.to_string(),
                line: n + 1,
                reason,
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 && fields.len() != 4 {
                return Err(malformed("Invalid number of fields".to_string()));
            }

            match section {
                Section::Bounds => bounds.extend(parse_range(&fields).map_err(malformed)?),
                Section::Ticks => ticks.extend(parse_range(&fields).map_err(malformed)?),
                Section::Colors => colors.push(parse_color(&fields).map_err(malformed)?),
                Section::UnderOverBad => special.push(parse_color(&fields).map_err(malformed)?),
            }
        }

        log::debug!(
            "Colormap {}: {} colors, {} bounds, {} ticks",
            source_name,
            colors.len(),
            bounds.len(),
            ticks.len()
        );

        Ok(Self {
            colors,
            bounds,
            ticks,
            under: special.first().copied().unwrap_or(OPAQUE_WHITE),
            over: special.get(1).copied().unwrap_or(OPAQUE_WHITE),
            bad: special.get(2).copied().unwrap_or(OPAQUE_WHITE),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PlotResult<Self> {
        let path = path.as_ref();
        log::info!("Loading colormap {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Bounds pair up with colors exactly when there is one more bound
    /// than there are colors.
    pub fn has_boundary_norm(&self) -> bool {
        !self.colors.is_empty() && self.bounds.len() == self.colors.len() + 1
    }

    pub fn scale(&self) -> ColorScale<'_> {
        if self.has_boundary_norm() {
            ColorScale::Boundaries {
                bounds: &self.bounds,
                colors: &self.colors,
            }
        } else {
            ColorScale::Listed {
                colors: &self.colors,
            }
        }
    }

    /// Color for `value` under boundary normalisation; `None` when the
    /// table has no usable bounds.
    pub fn color_for(&self, value: f64) -> Option<Rgba> {
        if !self.has_boundary_norm() {
            return None;
        }
        if value.is_nan() {
            return Some(self.bad);
        }
        if value < self.bounds[0] {
            return Some(self.under);
        }
        let band = self.bounds.partition_point(|b| *b <= value);
        if band >= self.bounds.len() {
            return Some(self.over);
        }
        Some(self.colors[band - 1])
    }
}

/// Finds colormap files by name along a search path
#[derive(Debug, Clone)]
pub struct ColormapLoader {
    search_path: Vec<PathBuf>,
}

impl Default for ColormapLoader {
    fn default() -> Self {
        let mut search_path = Vec::new();
        if let Some(dir) = dirs::data_dir() {
            search_path.push(dir.join("ccplot").join("cmap"));
        }
        search_path.push(PathBuf::from("/usr/local/share/ccplot/cmap"));
        search_path.push(PathBuf::from("/usr/share/ccplot/cmap"));
        Self { search_path }
    }
}

impl ColormapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Locate `name` as given, then in each search directory, with and
    /// without the `.cmap` extension.
    pub fn resolve(&self, name: &str) -> PlotResult<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Ok(direct);
        }
        for dir in &self.search_path {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            let with_ext = candidate.with_extension(COLORMAP_EXTENSION);
            if with_ext.is_file() {
                return Ok(with_ext);
            }
        }
        Err(PlotError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Colormap \"{}\" not found", name),
        )))
    }

    pub fn load(&self, name: &str) -> PlotResult<Colormap> {
        let path = self.resolve(name)?;
        Colormap::from_file(path)
    }
}
