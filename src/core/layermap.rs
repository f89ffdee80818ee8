use crate::types::{GridSpec, PlotError, PlotResult, Raster};
use ndarray::{Array1, Array2};

/// Layer product arrays for a window of rays
#[derive(Debug, Clone)]
pub struct LayerData {
    /// Per-ray, per-layer values `(nray, max_layers)`
    pub values: Array2<f32>,
    /// Number of layers detected in each ray
    pub nlayer: Array1<u8>,
    /// Layer base altitude `(nray, max_layers)`
    pub base: Array2<f32>,
    /// Layer top altitude `(nray, max_layers)`
    pub top: Array2<f32>,
}

/// Map layer data onto a regular vertical grid.
///
/// Output is `(nray, ygrid.n)`. Every layer paints its value into the cells
/// between its rounded base and top positions; later layers overwrite
/// earlier ones where they overlap.
///
/// Fails with `InvalidExtent` when no layer with a valid value reaches the
/// grid.
pub fn layermap(layers: &LayerData, ygrid: GridSpec, fill: f32) -> PlotResult<Raster> {
    ygrid.validate("altitude")?;

    let (nray, max_layers) = layers.values.dim();
    if layers.base.dim() != (nray, max_layers)
        || layers.top.dim() != (nray, max_layers)
        || layers.nlayer.len() != nray
    {
        return Err(PlotError::InvalidFormat(format!(
            "Dimensions do not match: data {:?}, base {:?}, top {:?}, nlayer {}",
            layers.values.dim(),
            layers.base.dim(),
            layers.top.dim(),
            layers.nlayer.len()
        )));
    }

    log::info!(
        "Mapping {} rays with up to {} layers onto {} altitude bins",
        nray,
        max_layers,
        ygrid.n
    );

    let m = ygrid.n as i64;
    let mut out = Array2::from_elem((nray, ygrid.n), fill);
    let mut painted = 0usize;

    for i in 0..nray {
        let count = (layers.nlayer[i] as usize).min(max_layers);
        for j in 0..count {
            let (yb, yt) = (layers.base[[i, j]], layers.top[[i, j]]);
            if !yb.is_finite() || !yt.is_finite() {
                continue;
            }
            let p = (ygrid.position(yb as f64).round() as i64).max(0);
            let q = (ygrid.position(yt as f64).round() as i64).min(m);
            let value = layers.values[[i, j]];
            for k in p..q {
                out[[i, k as usize]] = value;
            }
            if !value.is_nan() && p < q {
                painted += 1;
            }
        }
    }

    if painted == 0 {
        return Err(PlotError::InvalidExtent(
            "No valid layers in the selected extent".to_string(),
        ));
    }
    log::debug!("Painted {} layers", painted);

    Ok(out)
}
