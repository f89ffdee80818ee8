//! Python bindings for the gridding kernels and colormap loader

use crate::core::dimmap::{dimmap, dimmap2d, DimensionMap};
use crate::core::interpolate::{GridInterpolator, InterpolationParams};
use crate::core::layermap::{layermap, LayerData};
use crate::io::colormap::ColormapLoader;
use crate::types::{GridSpec, PlotError};
use ndarray::Axis;
use numpy::{IntoPyArray, PyArray2, PyArrayDyn, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<PlotError> for PyErr {
    fn from(e: PlotError) -> Self {
        let message = e.to_string();
        match e {
            PlotError::InvalidExtent(_)
            | PlotError::UnsupportedExtent { .. }
            | PlotError::InvalidRadius { .. }
            | PlotError::MalformedColormap { .. }
            | PlotError::InvalidFormat(_) => PyValueError::new_err(message),
            PlotError::MissingField(_) => PyKeyError::new_err(message),
            PlotError::Io(_) => PyIOError::new_err(message),
            PlotError::Processing(_) => PyRuntimeError::new_err(message),
        }
    }
}

/// Python module definition
#[pymodule]
fn _ccplot(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_dimmap, m)?)?;
    m.add_function(wrap_pyfunction!(py_dimmap2d, m)?)?;
    m.add_function(wrap_pyfunction!(py_interpolate2d, m)?)?;
    m.add_function(wrap_pyfunction!(py_layermap, m)?)?;
    m.add_function(wrap_pyfunction!(py_load_colormap, m)?)?;
    Ok(())
}

#[pyfunction]
#[pyo3(name = "dimmap", signature = (x, n, offset, increment, axis = 0, modulus = None))]
fn py_dimmap<'py>(
    py: Python<'py>,
    x: PyReadonlyArrayDyn<'py, f32>,
    n: usize,
    offset: i32,
    increment: i32,
    axis: usize,
    modulus: Option<f64>,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let out = dimmap(&x.as_array(), n, DimensionMap::new(offset, increment), Axis(axis), modulus)?;
    Ok(out.into_pyarray(py))
}

#[pyfunction]
#[pyo3(name = "dimmap2d", signature = (data, along, across, modulus = None))]
fn py_dimmap2d<'py>(
    py: Python<'py>,
    data: PyReadonlyArray2<'py, f32>,
    along: (i32, i32),
    across: (i32, i32),
    modulus: Option<f64>,
) -> PyResult<&'py PyArray2<f32>> {
    let out = dimmap2d(
        &data.as_array().to_owned(),
        DimensionMap::new(along.0, along.1),
        DimensionMap::new(across.0, across.1),
        modulus,
    )?;
    Ok(out.into_pyarray(py))
}

#[pyfunction]
#[pyo3(
    name = "interpolate2d",
    signature = (data, x, y, xgrid, ygrid, radius = (1, 1), fill = f32::NAN)
)]
fn py_interpolate2d<'py>(
    py: Python<'py>,
    data: PyReadonlyArray2<'py, f32>,
    x: PyReadonlyArray2<'py, f32>,
    y: PyReadonlyArray2<'py, f32>,
    xgrid: (f64, f64, usize),
    ygrid: (f64, f64, usize),
    radius: (i32, i32),
    fill: f32,
) -> PyResult<&'py PyArray2<f32>> {
    let interpolator = GridInterpolator::with_params(InterpolationParams {
        radius_x: radius.0,
        radius_y: radius.1,
        fill,
    });
    let out = interpolator.interpolate(
        &data.as_array().to_owned(),
        &x.as_array().to_owned(),
        &y.as_array().to_owned(),
        GridSpec::new(xgrid.0, xgrid.1, xgrid.2),
        GridSpec::new(ygrid.0, ygrid.1, ygrid.2),
    )?;
    Ok(out.into_pyarray(py))
}

#[pyfunction]
#[pyo3(name = "layermap", signature = (data, nlayer, base, top, ygrid, fill = f32::NAN))]
fn py_layermap<'py>(
    py: Python<'py>,
    data: PyReadonlyArray2<'py, f32>,
    nlayer: PyReadonlyArray1<'py, u8>,
    base: PyReadonlyArray2<'py, f32>,
    top: PyReadonlyArray2<'py, f32>,
    ygrid: (f64, f64, usize),
    fill: f32,
) -> PyResult<&'py PyArray2<f32>> {
    let layers = LayerData {
        values: data.as_array().to_owned(),
        nlayer: nlayer.as_array().to_owned(),
        base: base.as_array().to_owned(),
        top: top.as_array().to_owned(),
    };
    let out = layermap(&layers, GridSpec::new(ygrid.0, ygrid.1, ygrid.2), fill)?;
    Ok(out.into_pyarray(py))
}

/// Load a colormap by path or name; returns a dict of its sections.
#[pyfunction]
#[pyo3(name = "load_colormap")]
fn py_load_colormap<'py>(py: Python<'py>, name: &str) -> PyResult<&'py PyDict> {
    let cmap = ColormapLoader::default().load(name)?;
    let dict = PyDict::new(py);
    dict.set_item("colors", cmap.colors.clone())?;
    dict.set_item("bounds", cmap.bounds.clone())?;
    dict.set_item("ticks", cmap.ticks.clone())?;
    dict.set_item("under", cmap.under)?;
    dict.set_item("over", cmap.over)?;
    dict.set_item("bad", cmap.bad)?;
    dict.set_item("boundary_norm", cmap.has_boundary_norm())?;
    Ok(dict)
}
