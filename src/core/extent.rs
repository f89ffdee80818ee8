use crate::types::{IndexWindow, LonLatBox, PlotError, PlotResult, ProductKind};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User-specified horizontal extent, resolved lazily against a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HorizontalExtent {
    /// Whole track
    None,
    /// Along-track ray indices; negative values count from the end
    AlongTrack { along: (i64, i64) },
    /// Along-track and across-track indices of a swath
    AlongTrackAcrossTrack { along: (i64, i64), across: (i64, i64) },
    /// Time of day (UTC); times before the first sample fall on the next day
    AbsoluteTime { from: NaiveTime, to: NaiveTime },
    /// Signed offsets in seconds: non-negative from the first sample,
    /// negative from the last one
    RelativeTime { from: i64, to: i64 },
    LonLat(LonLatBox),
}

impl Default for HorizontalExtent {
    fn default() -> Self {
        HorizontalExtent::None
    }
}

impl HorizontalExtent {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HorizontalExtent::None => "none",
            HorizontalExtent::AlongTrack { .. } => "along-track",
            HorizontalExtent::AlongTrackAcrossTrack { .. } => "along-track/across-track",
            HorizontalExtent::AbsoluteTime { .. } => "absolute-time",
            HorizontalExtent::RelativeTime { .. } => "relative-time",
            HorizontalExtent::LonLat(_) => "longitude/latitude",
        }
    }

    fn unsupported(&self, product: ProductKind) -> PlotError {
        PlotError::UnsupportedExtent {
            extent: self.kind_name().to_string(),
            product,
        }
    }
}

fn invalid(text: &str) -> PlotError {
    PlotError::InvalidExtent(format!("Cannot parse extent \"{}\"", text))
}

/// Extent grammar, one pattern per accepted form
struct ExtentPatterns {
    lonlat: Regex,
    latlon: Regex,
    absolute: Regex,
    relative: Regex,
    along_across: Regex,
    along: Regex,
}

impl ExtentPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            lonlat: Regex::new(
                r"^(\d+(?:\.\d+)?)(E|W)\.\.(\d+(?:\.\d+)?)(E|W),(\d+(?:\.\d+)?)(S|N)\.\.(\d+(?:\.\d+)?)(S|N)$",
            )?,
            latlon: Regex::new(
                r"^(\d+(?:\.\d+)?)(S|N)\.\.(\d+(?:\.\d+)?)(S|N),(\d+(?:\.\d+)?)(E|W)\.\.(\d+(?:\.\d+)?)(E|W)$",
            )?,
            absolute: Regex::new(r"^(\d?\d):(\d\d)(?::(\d\d))?\.\.(\d?\d):(\d\d)(?::(\d\d))?$")?,
            relative: Regex::new(
                r"^(\+|-)(?:(\d+):)?(\d?\d):(\d\d)\.\.(\+|-)(?:(\d+):)?(\d?\d):(\d\d)$",
            )?,
            along_across: Regex::new(r"^([+-]?\d+)\.\.([+-]?\d+),([+-]?\d+)\.\.([+-]?\d+)$")?,
            along: Regex::new(r"^([+-]?\d+)\.\.([+-]?\d+)$")?,
        })
    }
}

static PATTERNS: Lazy<Result<ExtentPatterns, regex::Error>> = Lazy::new(ExtentPatterns::compile);

fn patterns() -> PlotResult<&'static ExtentPatterns> {
    PATTERNS
        .as_ref()
        .map_err(|e| PlotError::Processing(format!("Regex error: {}", e)))
}

/// `±[H:]MM:SS` as signed seconds; `None` when it does not fit a duration
fn offset_seconds(sign: i64, h: i64, m: i64, s: i64) -> Option<i64> {
    let total = h.checked_mul(3600)?.checked_add(m * 60 + s)?;
    let total = total.checked_mul(sign)?;
    Duration::try_seconds(total).map(|_| total)
}

fn number<T: FromStr>(text: &str, field: Option<regex::Match>) -> PlotResult<T> {
    field
        .map(|m| m.as_str())
        .unwrap_or("0")
        .parse()
        .map_err(|_| invalid(text))
}

fn signed_degrees(text: &str, value: &str, hemisphere: &str, positive: &str) -> PlotResult<f64> {
    let v: f64 = value.parse().map_err(|_| invalid(text))?;
    Ok(if hemisphere == positive { v } else { -v })
}

impl FromStr for HorizontalExtent {
    type Err = PlotError;

    /// Accepted forms:
    ///
    /// - `15E..30E,10S..5N` or `10S..5N,15E..30E`
    /// - `HH:MM[:SS]..HH:MM[:SS]`
    /// - `±[H:]MM:SS..±[H:]MM:SS`
    /// - `a..b,c..d` and `a..b` (ray indices)
    fn from_str(text: &str) -> PlotResult<Self> {
        let text = text.trim();

        let patterns = patterns()?;

        if let Some(c) = patterns.lonlat.captures(text) {
            let lon = (
                signed_degrees(text, &c[1], &c[2], "E")?,
                signed_degrees(text, &c[3], &c[4], "E")?,
            );
            let lat = (
                signed_degrees(text, &c[5], &c[6], "N")?,
                signed_degrees(text, &c[7], &c[8], "N")?,
            );
            return Ok(HorizontalExtent::LonLat(LonLatBox::new(lon, lat)));
        }

        if let Some(c) = patterns.latlon.captures(text) {
            let lat = (
                signed_degrees(text, &c[1], &c[2], "N")?,
                signed_degrees(text, &c[3], &c[4], "N")?,
            );
            let lon = (
                signed_degrees(text, &c[5], &c[6], "E")?,
                signed_degrees(text, &c[7], &c[8], "E")?,
            );
            return Ok(HorizontalExtent::LonLat(LonLatBox::new(lon, lat)));
        }

        if let Some(c) = patterns.absolute.captures(text) {
            let clock = |k: usize| -> PlotResult<NaiveTime> {
                let h: u32 = number(text, c.get(k))?;
                let m: u32 = number(text, c.get(k + 1))?;
                let s: u32 = number(text, c.get(k + 2))?;
                if h > 23 || m > 59 || s > 59 {
                    return Err(invalid(text));
                }
                NaiveTime::from_hms_opt(h, m, s).ok_or_else(|| invalid(text))
            };
            return Ok(HorizontalExtent::AbsoluteTime {
                from: clock(1)?,
                to: clock(4)?,
            });
        }

        if let Some(c) = patterns.relative.captures(text) {
            let mut offsets = [0i64; 2];
            for (slot, k) in offsets.iter_mut().zip([1usize, 5]) {
                let sign = if &c[k] == "-" { -1 } else { 1 };
                let h: i64 = number(text, c.get(k + 1))?;
                let m: i64 = number(text, c.get(k + 2))?;
                let s: i64 = number(text, c.get(k + 3))?;
                if m > 59 || s > 59 {
                    return Err(invalid(text));
                }
                *slot = offset_seconds(sign, h, m, s).ok_or_else(|| invalid(text))?;
            }
            return Ok(HorizontalExtent::RelativeTime {
                from: offsets[0],
                to: offsets[1],
            });
        }

        if let Some(c) = patterns.along_across.captures(text) {
            return Ok(HorizontalExtent::AlongTrackAcrossTrack {
                along: (number(text, c.get(1))?, number(text, c.get(2))?),
                across: (number(text, c.get(3))?, number(text, c.get(4))?),
            });
        }

        if let Some(c) = patterns.along.captures(text) {
            return Ok(HorizontalExtent::AlongTrack {
                along: (number(text, c.get(1))?, number(text, c.get(2))?),
            });
        }

        Err(invalid(text))
    }
}

/// Normalise a raw index against bounds `a..=b`: values past `b` clamp to
/// `b`, values below `a` wrap from the end (`x + b`) and clamp to `a`.
pub fn norm_index(x: i64, a: i64, b: i64) -> i64 {
    if x > b {
        return b;
    }
    let x = if x < a { x + b } else { x };
    if x < a {
        a
    } else {
        x
    }
}

/// Target of a time extent endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeTarget {
    Clock(NaiveTime),
    Offset(Duration),
}

/// Instant a target refers to; `None` when it falls outside the calendar
fn reference_time(
    target: TimeTarget,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match target {
        TimeTarget::Offset(offset) if offset < Duration::zero() => last.checked_add_signed(offset),
        TimeTarget::Offset(offset) => first.checked_add_signed(offset),
        TimeTarget::Clock(t) => {
            let date = first.date_naive();
            let date = if t < first.time() {
                date.succ_opt()?
            } else {
                date
            };
            Some(Utc.from_utc_datetime(&date.and_time(t)))
        }
    }
}

/// Index of the sample whose time best matches `target`.
///
/// Returns `None` for an empty time axis, or when the target cannot be
/// placed on the calendar.
pub fn time_to_ray(target: TimeTarget, times: &[DateTime<Utc>]) -> Option<usize> {
    let (first, last) = (*times.first()?, *times.last()?);
    let reference = reference_time(target, first, last)?;

    let i = times.partition_point(|t| *t <= reference).min(times.len() - 1);
    let distance = |k: usize| {
        (reference - times[k])
            .num_microseconds()
            .map(i64::abs)
            .unwrap_or(i64::MAX)
    };

    let here = distance(i);
    if i > 0 && distance(i - 1) < here {
        return Some(i - 1);
    }
    if i + 1 < times.len() && distance(i + 1) < here {
        return Some(i + 1);
    }
    Some(i)
}

/// Boundaries of the single contiguous run of samples inside `bbox`.
///
/// `e1` is the last index of the leading run outside the box (0 if the
/// track starts inside), `e2` the last index of the following inside run.
/// Later passes through the box are not considered.
pub fn lonlat_to_ray(bbox: &LonLatBox, lon: &[f64], lat: &[f64]) -> (usize, usize) {
    let inside = |i: usize| bbox.contains(lon[i], lat[i]);
    let n = lon.len().min(lat.len());

    let (mut e1, mut e2) = (0, 0);
    let mut i = 0;
    while i < n && !inside(i) {
        e1 = i;
        i += 1;
    }
    while i < n && inside(i) {
        e2 = i;
        i += 1;
    }
    (e1, e2)
}

/// Along-track axis of a profile product
#[derive(Debug, Clone, Copy)]
pub struct TrackAxis<'a> {
    pub times: &'a [DateTime<Utc>],
    pub lon: &'a [f64],
    pub lat: &'a [f64],
}

impl<'a> TrackAxis<'a> {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

fn window(e1: i64, e2: i64, n: usize) -> PlotResult<IndexWindow> {
    let n_i = n as i64;
    let e1 = norm_index(e1, 0, n_i);
    let e2 = norm_index(e2, 0, n_i);
    if e1 >= e2 {
        return Err(PlotError::InvalidExtent(format!(
            "Resolved window {}..{} is empty",
            e1, e2
        )));
    }
    IndexWindow::new(e1 as usize, e2 as usize, n)
}

fn time_index(target: TimeTarget, times: &[DateTime<Utc>]) -> PlotResult<i64> {
    if times.is_empty() {
        return Err(PlotError::InvalidExtent("Time axis is empty".to_string()));
    }
    time_to_ray(target, times)
        .map(|i| i as i64)
        .ok_or_else(|| PlotError::InvalidExtent(format!("Time {:?} is out of range", target)))
}

fn offset(seconds: i64) -> PlotResult<TimeTarget> {
    Duration::try_seconds(seconds)
        .map(TimeTarget::Offset)
        .ok_or_else(|| PlotError::InvalidExtent(format!("Time offset {} s is out of range", seconds)))
}

/// Resolve a horizontal extent into a ray window of a profile product.
pub fn resolve_profile_extent(
    extent: &HorizontalExtent,
    product: ProductKind,
    track: &TrackAxis,
) -> PlotResult<IndexWindow> {
    let time_supported = matches!(
        product,
        ProductKind::CloudSatProfile | ProductKind::CalipsoProfile
    );

    let (e1, e2) = match extent {
        HorizontalExtent::None => (0, -1),
        HorizontalExtent::AlongTrack { along } => *along,
        HorizontalExtent::AbsoluteTime { from, to } if time_supported => (
            time_index(TimeTarget::Clock(*from), track.times)?,
            time_index(TimeTarget::Clock(*to), track.times)?,
        ),
        HorizontalExtent::RelativeTime { from, to } if time_supported => (
            time_index(offset(*from)?, track.times)?,
            time_index(offset(*to)?, track.times)?,
        ),
        HorizontalExtent::LonLat(bbox) => {
            let (e1, e2) = lonlat_to_ray(bbox, track.lon, track.lat);
            (e1 as i64, e2 as i64)
        }
        _ => return Err(extent.unsupported(product)),
    };

    let resolved = window(e1, e2, track.len())?;
    log::debug!(
        "Resolved {} extent to rays {}..{}",
        extent.kind_name(),
        resolved.start,
        resolved.end
    );
    Ok(resolved)
}

/// Resolve a horizontal extent into along/across-track windows of a swath.
///
/// A longitude/latitude box selects the whole swath; it only drives the
/// map extent.
pub fn resolve_swath_extent(
    extent: &HorizontalExtent,
    nalong: usize,
    nacross: usize,
) -> PlotResult<(IndexWindow, IndexWindow)> {
    let (along, across) = match extent {
        HorizontalExtent::None | HorizontalExtent::LonLat(_) => ((0, -1), (0, -1)),
        HorizontalExtent::AlongTrack { along } => (*along, (0, -1)),
        HorizontalExtent::AlongTrackAcrossTrack { along, across } => (*along, *across),
        _ => return Err(extent.unsupported(ProductKind::ModisSwath)),
    };
    Ok((
        window(along.0, along.1, nalong)?,
        window(across.0, across.1, nacross)?,
    ))
}
