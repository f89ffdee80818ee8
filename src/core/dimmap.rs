use crate::types::{PlotError, PlotResult};
use ndarray::{Array, Array2, ArrayBase, ArrayView1, ArrayViewMut1, Axis, Data, Dimension};
use serde::{Deserialize, Serialize};

/// HDF-EOS dimension map between a geolocation dimension and a data dimension.
///
/// Data index `i` corresponds to the continuous geolocation position
/// `(i - offset) / increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMap {
    pub offset: i32,
    pub increment: i32,
}

impl DimensionMap {
    pub fn new(offset: i32, increment: i32) -> Self {
        Self { offset, increment }
    }

    pub fn identity() -> Self {
        Self::new(0, 1)
    }

    /// Same mapping, re-based so that output index 0 is data index `start`.
    pub fn starting_at(&self, start: usize) -> Self {
        Self {
            offset: self.offset - start as i32,
            increment: self.increment,
        }
    }

    /// Continuous position in the tie-point array for output index `i`
    pub fn source_position(&self, i: usize) -> f64 {
        (i as f64 - self.offset as f64) / self.increment as f64
    }

    fn validate(&self) -> PlotResult<()> {
        if self.increment == 0 {
            return Err(PlotError::Processing(
                "Dimension map increment must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DimensionMap {
    fn default() -> Self {
        Self::identity()
    }
}

/// Folds a difference into `(-modulus/2, modulus/2]`, the shortest way round.
pub(crate) fn fold_symmetric(diff: f64, modulus: f64) -> f64 {
    let r = diff.rem_euclid(modulus);
    if r > modulus / 2.0 {
        r - modulus
    } else {
        r
    }
}

/// Neighbouring tie points of a continuous position.
///
/// The integer part is truncated toward zero before clamping, so positions
/// slightly before the first tie point extrapolate along the first gradient
/// while positions past the last tie point hold the last value.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    k0: usize,
    k1: usize,
    frac: f64,
}

impl Bracket {
    fn at(position: f64, len: usize) -> Self {
        let k = position.trunc();
        let last = (len - 1) as f64;
        Self {
            k0: k.clamp(0.0, last) as usize,
            k1: (k + 1.0).clamp(0.0, last) as usize,
            frac: position - k,
        }
    }
}

fn blend(x0: f64, x1: f64, frac: f64, modulus: Option<f64>) -> f64 {
    match modulus {
        Some(m) => (x0 + frac * fold_symmetric(x1 - x0, m)).rem_euclid(m),
        None => x0 + frac * (x1 - x0),
    }
}

fn map_lane(
    src: ArrayView1<f32>,
    mut dst: ArrayViewMut1<f32>,
    map: DimensionMap,
    modulus: Option<f64>,
) {
    let len = src.len();
    for (i, out) in dst.iter_mut().enumerate() {
        let b = Bracket::at(map.source_position(i), len);
        *out = blend(src[b.k0] as f64, src[b.k1] as f64, b.frac, modulus) as f32;
    }
}

fn validate_modulus(modulus: Option<f64>) -> PlotResult<()> {
    match modulus {
        Some(m) if !(m > 0.0 && m.is_finite()) => Err(PlotError::Processing(format!(
            "Invalid modulus {}",
            m
        ))),
        _ => Ok(()),
    }
}

/// Upsample `x` along `axis` to length `n` by linear interpolation between
/// tie points.
///
/// With a `modulus`, neighbour differences take the shortest path round the
/// circle and results are folded into `[0, modulus)`.
pub fn dimmap<S, D>(
    x: &ArrayBase<S, D>,
    n: usize,
    map: DimensionMap,
    axis: Axis,
    modulus: Option<f64>,
) -> PlotResult<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    map.validate()?;
    validate_modulus(modulus)?;

    if axis.index() >= x.ndim() {
        return Err(PlotError::Processing(format!(
            "Axis {} out of bounds for {}-dimensional array",
            axis.index(),
            x.ndim()
        )));
    }
    if x.len_of(axis) == 0 {
        return Err(PlotError::Processing(
            "Cannot map an empty dimension".to_string(),
        ));
    }

    log::debug!(
        "Dimension mapping axis {} from {} to {} (offset {}, increment {})",
        axis.index(),
        x.len_of(axis),
        n,
        map.offset,
        map.increment
    );

    let mut shape = x.raw_dim();
    shape[axis.index()] = n;
    let mut out = Array::<f32, D>::zeros(shape);

    for (src, dst) in x.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        map_lane(src, dst, map, modulus);
    }

    Ok(out)
}

/// Bilinear 2-D dimension mapping onto the full `(L1*inc1, L2*inc2)` grid.
///
/// Differences to the three other corners are taken relative to the first
/// corner, modulo `modulus` when given. With a modulus the blended value is
/// also folded into `[0, modulus)`; with a modulus of 360, longitudes come
/// out in `0..360` rather than `-180..180`.
pub fn dimmap2d(
    data: &Array2<f32>,
    along: DimensionMap,
    across: DimensionMap,
    modulus: Option<f64>,
) -> PlotResult<Array2<f32>> {
    validate_modulus(modulus)?;
    if along.increment <= 0 || across.increment <= 0 {
        return Err(PlotError::Processing("Invalid increment".to_string()));
    }

    let (xdim, ydim) = data.dim();
    if xdim == 0 || ydim == 0 {
        return Err(PlotError::Processing(
            "Cannot map an empty dimension".to_string(),
        ));
    }

    let out_dim = (
        xdim * along.increment as usize,
        ydim * across.increment as usize,
    );
    log::debug!("Bilinear dimension mapping {:?} -> {:?}", data.dim(), out_dim);

    let fold = |d: f64| match modulus {
        Some(m) => fold_symmetric(d, m),
        None => d,
    };

    let out = Array2::from_shape_fn(out_dim, |(i, j)| {
        let bk = Bracket::at(along.source_position(i), xdim);
        let bl = Bracket::at(across.source_position(j), ydim);
        let (dk, dl) = (bk.frac, bl.frac);

        let b1 = data[[bk.k0, bl.k0]] as f64;
        let r2 = fold(data[[bk.k0, bl.k1]] as f64 - b1);
        let r3 = fold(data[[bk.k1, bl.k0]] as f64 - b1);
        let r4 = fold(data[[bk.k1, bl.k1]] as f64 - b1);

        let value = b1 + r2 * (1.0 - dk) * dl + r3 * dk * (1.0 - dl) + r4 * dk * dl;
        match modulus {
            Some(m) => value.rem_euclid(m) as f32,
            None => value as f32,
        }
    });

    Ok(out)
}

/// Full-resolution longitude/latitude grids
#[derive(Debug, Clone)]
pub struct Geolocation {
    pub lon: Array2<f32>,
    pub lat: Array2<f32>,
}

/// Reconstruct a geolocation grid from coarse tie points.
///
/// Both arrays are mapped along axis 0 then axis 1 using circular
/// arithmetic, then longitude is wrapped into `[-180, 180)` and latitude
/// into `[-90, 90)`.
pub fn dimmap_geolocation(
    lon: &Array2<f32>,
    lat: &Array2<f32>,
    along: (usize, DimensionMap),
    across: (usize, DimensionMap),
) -> PlotResult<Geolocation> {
    if lon.dim() != lat.dim() {
        return Err(PlotError::InvalidFormat(format!(
            "Longitude {:?} and latitude {:?} shapes differ",
            lon.dim(),
            lat.dim()
        )));
    }

    let map2 = |x: &Array2<f32>| -> PlotResult<Array2<f32>> {
        let stage = dimmap(x, along.0, along.1, Axis(0), Some(360.0))?;
        dimmap(&stage, across.0, across.1, Axis(1), Some(360.0))
    };

    let lon = map2(lon)?.mapv(|v| ((v as f64 + 180.0).rem_euclid(360.0) - 180.0) as f32);
    let lat = map2(lat)?.mapv(|v| ((v as f64 + 90.0).rem_euclid(180.0) - 90.0) as f32);

    Ok(Geolocation { lon, lat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_identity_mapping() {
        let x = array![1.5f32, -2.25, 7.0, 3.125];
        let out = dimmap(&x, 4, DimensionMap::identity(), Axis(0), None).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn test_linear_upsampling() {
        let x = array![0.0f32, 10.0, 20.0];
        let out = dimmap(&x, 5, DimensionMap::new(0, 2), Axis(0), None).unwrap();
        assert_eq!(out.to_vec(), vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_modular_short_path() {
        let x = array![350.0f32, 5.0];
        let out = dimmap(&x, 11, DimensionMap::new(0, 10), Axis(0), Some(360.0)).unwrap();

        for v in out.iter() {
            assert!(*v >= 0.0 && *v < 360.0);
            assert!(*v > 340.0 || *v < 10.0, "value {} left the short path", v);
        }
        for w in out.windows(2) {
            let step = fold_symmetric((w[1] - w[0]) as f64, 360.0);
            assert!(step > 0.0 && step < 2.0);
        }
        assert!((out[10] - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_tie_point_edge_extrapolation() {
        let x = array![350.0f32, 5.0, 20.0, 10.0, 350.0];
        let out = dimmap(&x, 30, DimensionMap::new(4, 5), Axis(0), Some(360.0)).unwrap();

        assert!((out[0] - 338.0).abs() < 1e-3);
        assert!((out[7] - 359.0).abs() < 1e-3);
        assert!((out[8] - 2.0).abs() < 1e-3);
        // past the last tie point the value holds
        assert!((out[29] - 350.0).abs() < 1e-3);
    }

    #[test]
    fn test_mapping_along_second_axis() {
        let x = array![[0.0f32, 4.0], [10.0, 14.0]];
        let out = dimmap(&x, 3, DimensionMap::new(0, 2), Axis(1), None).unwrap();
        assert_eq!(out.dim(), (2, 3));
        assert_eq!(out.row(0).to_vec(), vec![0.0, 2.0, 4.0]);
        assert_eq!(out.row(1).to_vec(), vec![10.0, 12.0, 14.0]);
    }

    #[test]
    fn test_rejects_zero_increment() {
        let x = Array1::<f32>::zeros(3);
        assert!(dimmap(&x, 3, DimensionMap::new(0, 0), Axis(0), None).is_err());
        assert!(dimmap(&x, 3, DimensionMap::identity(), Axis(1), None).is_err());
    }

    #[test]
    fn test_bilinear_dimmap2d() {
        let x = array![[0.0f32, 2.0], [4.0, 6.0]];
        let out = dimmap2d(&x, DimensionMap::new(0, 2), DimensionMap::new(0, 2), None).unwrap();
        assert_eq!(out.dim(), (4, 4));
        assert!((out[[1, 1]] - 3.0).abs() < 1e-6);
        assert!((out[[0, 1]] - 1.0).abs() < 1e-6);
        assert!((out[[3, 3]] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_modular_dimmap2d_folds_to_positive_range() {
        let x = array![[170.0f32, -170.0], [170.0, -170.0]];
        let out = dimmap2d(&x, DimensionMap::new(0, 2), DimensionMap::new(0, 2), Some(360.0)).unwrap();
        assert!((out[[0, 0]] - 170.0).abs() < 1e-4);
        // across the dateline, not through zero
        assert!((out[[0, 1]] - 180.0).abs() < 1e-4);
        assert!((out[[0, 2]] - 190.0).abs() < 1e-4);
        assert!(out.iter().all(|v| (0.0..360.0).contains(v)));
    }

    #[test]
    fn test_geolocation_wraps_longitude() {
        let lon = array![[170.0f32, -170.0], [170.0, -170.0]];
        let lat = array![[-10.0f32, -10.0], [10.0, 10.0]];
        let geo = dimmap_geolocation(
            &lon,
            &lat,
            (3, DimensionMap::new(0, 2)),
            (3, DimensionMap::new(0, 2)),
        )
        .unwrap();

        assert!((geo.lon[[0, 1]] - 180.0).abs() < 1e-3 || (geo.lon[[0, 1]] + 180.0).abs() < 1e-3);
        assert!((geo.lat[[1, 0]] - 0.0).abs() < 1e-4);
        assert!((geo.lat[[0, 0]] + 10.0).abs() < 1e-4);
        for v in geo.lon.iter() {
            assert!(*v >= -180.0 && *v < 180.0);
        }
    }
}
