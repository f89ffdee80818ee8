use crate::types::{GridSpec, PlotError, PlotResult, Raster};
use ndarray::{Array2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};

/// Parameters of the scattered-to-grid interpolator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationParams {
    /// Search half-width along x, in output cells
    pub radius_x: i32,
    /// Search half-width along y, in output cells
    pub radius_y: i32,
    /// Value of cells with no sample in range
    pub fill: f32,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            radius_x: 1,
            radius_y: 1,
            fill: f32::NAN,
        }
    }
}

/// A valid sample projected into output-cell coordinates
#[derive(Debug, Clone, Copy)]
struct Projected {
    kf: f64,
    lf: f64,
    /// Rounded cell of the sample
    k: i64,
    l: i64,
    value: f32,
    order: usize,
}

/// Samples bucketed into blocks of `rx` x `ry` rounded cells.
///
/// Block coordinates are shifted by one radius so that samples just outside
/// the raster (down to `-rx`, `-ry`) still land in block 0 and reach the
/// edge cells. A cell's search window then spans at most 3 x 3 blocks.
/// Blocks are stored compressed: `starts[b]..starts[b + 1]` indexes into
/// `samples`, which keeps input order within a block.
struct SampleIndex {
    rx: usize,
    ry: usize,
    cols: usize,
    rows: usize,
    starts: Vec<usize>,
    samples: Vec<Projected>,
}

impl SampleIndex {
    fn build(points: Vec<Projected>, rx: usize, ry: usize, nx: usize, ny: usize) -> Self {
        let cols = (nx + 2 * rx) / rx + 1;
        let rows = (ny + 2 * ry) / ry + 1;
        let block = |p: &Projected| {
            let bx = (p.k + rx as i64) as usize / rx;
            let by = (p.l + ry as i64) as usize / ry;
            bx * rows + by
        };

        let mut counts = vec![0usize; cols * rows + 1];
        for p in &points {
            counts[block(p) + 1] += 1;
        }
        for b in 1..counts.len() {
            counts[b] += counts[b - 1];
        }

        let starts = counts.clone();
        let mut cursor = counts;
        let mut samples = vec![
            Projected {
                kf: 0.0,
                lf: 0.0,
                k: 0,
                l: 0,
                value: 0.0,
                order: 0,
            };
            points.len()
        ];
        for p in points {
            let b = block(&p);
            samples[cursor[b]] = p;
            cursor[b] += 1;
        }

        Self {
            rx,
            ry,
            cols,
            rows,
            starts,
            samples,
        }
    }

    /// Blocks that may hold samples whose window covers cell `i` along x
    fn block_cols(&self, i: usize) -> std::ops::RangeInclusive<usize> {
        let lo = i / self.rx;
        let hi = (i + 2 * self.rx) / self.rx;
        lo..=hi.min(self.cols - 1)
    }

    fn block_rows(&self, j: usize) -> std::ops::RangeInclusive<usize> {
        let lo = j / self.ry;
        let hi = (j + 2 * self.ry) / self.ry;
        lo..=hi.min(self.rows - 1)
    }

    fn block(&self, bx: usize, by: usize) -> &[Projected] {
        let b = bx * self.rows + by;
        &self.samples[self.starts[b]..self.starts[b + 1]]
    }
}

/// Rasterises scattered, geolocated samples onto a regular grid.
///
/// Each output cell takes the value of the nearest sample (in output-cell
/// units) among those whose rounded cell lies within the rectangular search
/// window. Ties go to the sample that appears first in the input. Cells with
/// no sample in range receive the fill value.
pub struct GridInterpolator {
    params: InterpolationParams,
}

impl GridInterpolator {
    pub fn new(radius_x: i32, radius_y: i32) -> Self {
        Self::with_params(InterpolationParams {
            radius_x,
            radius_y,
            ..InterpolationParams::default()
        })
    }

    pub fn with_params(params: InterpolationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &InterpolationParams {
        &self.params
    }

    /// Interpolate `values` located at `(x, y)` onto the `xgrid` x `ygrid`
    /// raster. Output is indexed `[x cell, y cell]`.
    pub fn interpolate(
        &self,
        values: &Array2<f32>,
        x: &Array2<f32>,
        y: &Array2<f32>,
        xgrid: GridSpec,
        ygrid: GridSpec,
    ) -> PlotResult<Raster> {
        let (rx, ry) = (self.params.radius_x, self.params.radius_y);
        if rx <= 0 || ry <= 0 {
            return Err(PlotError::InvalidRadius {
                radius_x: rx,
                radius_y: ry,
            });
        }
        xgrid.validate("x")?;
        ygrid.validate("y")?;

        if x.dim() != values.dim() || y.dim() != values.dim() {
            return Err(PlotError::InvalidFormat(format!(
                "Dimensions do not match: data {:?}, x {:?}, y {:?}",
                values.dim(),
                x.dim(),
                y.dim()
            )));
        }

        log::info!(
            "Interpolating {} samples onto {}x{} grid (rx={}, ry={})",
            values.len(),
            xgrid.n,
            ygrid.n,
            rx,
            ry
        );

        let (nx, ny) = (xgrid.n, ygrid.n);
        let (pad_x, pad_y) = (rx as usize, ry as usize);
        let mut valid = 0usize;
        let mut points = Vec::new();

        for (order, ((v, xv), yv)) in values.iter().zip(x.iter()).zip(y.iter()).enumerate() {
            if v.is_nan() || !xv.is_finite() || !yv.is_finite() {
                continue;
            }
            valid += 1;

            let kf = xgrid.position(*xv as f64);
            let lf = ygrid.position(*yv as f64);
            let k = kf.round();
            let l = lf.round();

            // Window does not touch the raster.
            if k < -(rx as f64)
                || l < -(ry as f64)
                || k >= (nx + pad_x) as f64
                || l >= (ny + pad_y) as f64
            {
                continue;
            }
            points.push(Projected {
                kf,
                lf,
                k: k as i64,
                l: l as i64,
                value: *v,
                order,
            });
        }

        if valid == 0 {
            return Err(PlotError::InvalidExtent(
                "No valid samples in the selected extent".to_string(),
            ));
        }
        log::debug!("{} of {} valid samples fall near the grid", points.len(), valid);

        let index = SampleIndex::build(points, pad_x, pad_y, nx, ny);
        let mut out = Array2::from_elem((nx, ny), self.params.fill);
        self.fill_rows(&index, &mut out, rx as usize, ry as usize);

        Ok(out)
    }

    /// Interpolate vertical profiles onto an altitude grid.
    ///
    /// Row `i` of `values` is one profile sampled at `heights[i, ..]`; it
    /// becomes output row `i` and never borrows from neighbouring profiles.
    /// Only `radius_y` limits the search.
    pub fn interpolate_profiles(
        &self,
        values: &Array2<f32>,
        heights: &Array2<f32>,
        ygrid: GridSpec,
    ) -> PlotResult<Raster> {
        let ry = self.params.radius_y;
        if ry <= 0 {
            return Err(PlotError::InvalidRadius {
                radius_x: self.params.radius_x,
                radius_y: ry,
            });
        }
        ygrid.validate("altitude")?;
        if heights.dim() != values.dim() {
            return Err(PlotError::InvalidFormat(format!(
                "Dimensions do not match: data {:?}, heights {:?}",
                values.dim(),
                heights.dim()
            )));
        }
        if !values.iter().any(|v| !v.is_nan()) {
            return Err(PlotError::InvalidExtent(
                "No valid samples in the selected extent".to_string(),
            ));
        }

        log::info!(
            "Interpolating {} profiles onto {} altitude bins (ry={})",
            values.nrows(),
            ygrid.n,
            ry
        );

        let mut out = Array2::from_elem((values.nrows(), ygrid.n), self.params.fill);
        let fill_profile = |(i, mut row): (usize, ArrayViewMut1<f32>)| {
            let mut best = vec![f64::INFINITY; ygrid.n];
            let samples = values.row(i).into_iter().zip(heights.row(i).into_iter());
            for (v, h) in samples {
                if v.is_nan() || !h.is_finite() {
                    continue;
                }
                let lf = ygrid.position(*h as f64);
                let l = lf.round() as i64;
                let lo = (l - ry as i64).max(0);
                let hi = (l + ry as i64).min(ygrid.n as i64 - 1);
                for j in lo..=hi {
                    let d = (j as f64 - lf).abs();
                    // strict: earlier samples keep ties
                    if d < best[j as usize] {
                        best[j as usize] = d;
                        row[j as usize] = *v;
                    }
                }
            }
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(fill_profile);
        }
        #[cfg(not(feature = "parallel"))]
        out.axis_iter_mut(Axis(0)).enumerate().for_each(fill_profile);

        Ok(out)
    }

    #[cfg(feature = "parallel")]
    fn fill_rows(&self, index: &SampleIndex, out: &mut Raster, rx: usize, ry: usize) {
        use rayon::prelude::*;

        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, row)| Self::fill_row(index, i, row, rx, ry));
    }

    #[cfg(not(feature = "parallel"))]
    fn fill_rows(&self, index: &SampleIndex, out: &mut Raster, rx: usize, ry: usize) {
        for (i, row) in out.axis_iter_mut(Axis(0)).enumerate() {
            Self::fill_row(index, i, row, rx, ry);
        }
    }

    fn fill_row(index: &SampleIndex, i: usize, mut row: ArrayViewMut1<f32>, rx: usize, ry: usize) {
        let (ci, rx, ry) = (i as i64, rx as i64, ry as i64);
        let cols = index.block_cols(i);

        for (j, cell) in row.iter_mut().enumerate() {
            let cj = j as i64;
            let mut best: Option<(f64, usize, f32)> = None;
            for bx in cols.clone() {
                for by in index.block_rows(j) {
                    for s in index.block(bx, by) {
                        if (s.k - ci).abs() > rx || (s.l - cj).abs() > ry {
                            continue;
                        }
                        let dk = i as f64 - s.kf;
                        let dl = j as f64 - s.lf;
                        let d = dk * dk + dl * dl;
                        let closer = best.map_or(true, |(bd, bo, _)| {
                            d < bd || (d == bd && s.order < bo)
                        });
                        if closer {
                            best = Some((d, s.order, s.value));
                        }
                    }
                }
            }

            if let Some((_, _, value)) = best {
                *cell = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_sample_exact_cell() {
        let xgrid = GridSpec::new(0.0, 10.0, 10);
        let ygrid = GridSpec::new(-5.0, 5.0, 20);
        let values = array![[42.0f32]];
        let x = array![[xgrid.coordinate(3) as f32]];
        let y = array![[ygrid.coordinate(11) as f32]];

        let out = GridInterpolator::new(1, 2)
            .interpolate(&values, &x, &y, xgrid, ygrid)
            .unwrap();

        assert_eq!(out.dim(), (10, 20));
        assert_eq!(out[[3, 11]], 42.0);
        assert_eq!(out[[4, 13]], 42.0);
        assert!(out[[5, 11]].is_nan());
        assert!(out[[3, 14]].is_nan());
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn test_nearest_sample_wins() {
        let xgrid = GridSpec::new(0.0, 10.0, 10);
        let ygrid = GridSpec::new(0.0, 10.0, 10);
        let values = array![[1.0f32, 2.0]];
        let x = array![[4.0f32, 6.0]];
        let y = array![[5.0f32, 5.0]];

        let out = GridInterpolator::new(2, 2)
            .interpolate(&values, &x, &y, xgrid, ygrid)
            .unwrap();

        assert_eq!(out[[4, 5]], 1.0);
        assert_eq!(out[[6, 5]], 2.0);
        // equidistant: first sample in input order
        assert_eq!(out[[5, 5]], 1.0);
    }

    #[test]
    fn test_sample_outside_grid_reaches_edge() {
        let xgrid = GridSpec::new(0.0, 10.0, 10);
        let ygrid = GridSpec::new(0.0, 10.0, 10);
        let out = GridInterpolator::new(1, 1)
            .interpolate(&array![[7.0f32]], &array![[-1.0f32]], &array![[0.0f32]], xgrid, ygrid)
            .unwrap();
        assert_eq!(out[[0, 0]], 7.0);
        assert!(out[[1, 0]].is_nan());
    }

    #[test]
    fn test_wide_radius_covers_exact_window() {
        let xgrid = GridSpec::new(0.0, 400.0, 400);
        let ygrid = GridSpec::new(0.0, 400.0, 400);
        let values = array![[5.0f32, 9.0]];
        let x = array![[xgrid.coordinate(200) as f32, xgrid.coordinate(10) as f32]];
        let y = array![[ygrid.coordinate(150) as f32, ygrid.coordinate(395) as f32]];

        let out = GridInterpolator::new(40, 40)
            .interpolate(&values, &x, &y, xgrid, ygrid)
            .unwrap();

        // full 81x81 block, plus the second sample clipped at x = 0 and y = 399
        let painted = out.iter().filter(|v| !v.is_nan()).count();
        assert_eq!(painted, 81 * 81 + 51 * 45);
        assert_eq!(out[[160, 110]], 5.0);
        assert_eq!(out[[240, 190]], 5.0);
        assert!(out[[241, 150]].is_nan());
        assert!(out[[200, 191]].is_nan());
        assert_eq!(out[[0, 399]], 9.0);
        assert_eq!(out[[50, 355]], 9.0);
        assert!(out[[51, 399]].is_nan());
    }

    #[test]
    fn test_invalid_radius() {
        let g = GridSpec::new(0.0, 1.0, 4);
        let v = array![[1.0f32]];
        let err = GridInterpolator::new(0, 1).interpolate(&v, &v, &v, g, g);
        assert!(matches!(err, Err(PlotError::InvalidRadius { radius_x: 0, radius_y: 1 })));
    }

    #[test]
    fn test_invalid_extent() {
        let v = array![[1.0f32]];
        let err = GridInterpolator::new(1, 1).interpolate(
            &v,
            &v,
            &v,
            GridSpec::new(1.0, 0.0, 4),
            GridSpec::new(0.0, 1.0, 4),
        );
        assert!(matches!(err, Err(PlotError::InvalidExtent(_))));
    }

    #[test]
    fn test_profiles_stay_in_their_row() {
        let ygrid = GridSpec::new(0.0, 1000.0, 10);
        let values = array![[1.0f32, 2.0], [3.0, f32::NAN]];
        let heights = array![[150.0f32, 650.0], [450.0, 850.0]];

        let out = GridInterpolator::new(1, 1)
            .interpolate_profiles(&values, &heights, ygrid)
            .unwrap();

        assert_eq!(out.dim(), (2, 10));
        assert_eq!(out[[0, 1]], 1.0);
        assert_eq!(out[[0, 2]], 1.0);
        assert_eq!(out[[0, 6]], 2.0);
        assert!(out[[0, 4]].is_nan());
        assert_eq!(out[[1, 4]], 3.0);
        assert!(out[[1, 8]].is_nan());
        assert!(out[[1, 1]].is_nan());
    }

    #[test]
    fn test_all_nan_input_is_rejected() {
        let g = GridSpec::new(0.0, 1.0, 4);
        let v = array![[f32::NAN, f32::NAN]];
        let c = array![[0.5f32, 0.5]];
        let err = GridInterpolator::new(1, 1).interpolate(&v, &c, &c, g, g);
        assert!(matches!(err, Err(PlotError::InvalidExtent(_))));
    }
}
