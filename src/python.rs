//! PyO3 bindings for the conditional sampler.
//!
//! Exposes `condtab.CondSampler` as a Python class via maturin. The training
//! loop hands over the transformed matrix as a numpy array and the layout as
//! a list of `(kind, width)` tuples, then pulls conditioning batches as
//! numpy arrays.

use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::common::{EncodedMatrix, Segment};
use crate::sampler::{CondBatch, CondSampler};

/// Convert a `CondBatch` into a Python dict of numpy arrays.
///
/// Uses `PyArray::from_vec` for zero-copy ownership transfer from Rust to NumPy.
fn batch_to_dict<'py>(py: Python<'py>, batch: CondBatch) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    let b = batch.batch_size;

    let cond = PyArray1::from_vec(py, batch.cond).reshape([b, batch.cond_dim])?;
    dict.set_item("cond", cond)?;

    let mask = PyArray1::from_vec(py, batch.mask).reshape([b, batch.num_columns])?;
    dict.set_item("mask", mask)?;

    dict.set_item("column_ids", PyArray1::from_vec(py, batch.column_ids))?;
    dict.set_item("category_ids", PyArray1::from_vec(py, batch.category_ids))?;

    Ok(dict)
}

/// Parse `(kind, width)` tuples into layout segments.
fn parse_layout(layout: &[(String, usize)]) -> PyResult<Vec<Segment>> {
    layout
        .iter()
        .map(|(kind, width)| match kind.as_str() {
            "continuous" => Ok(Segment::continuous(*width)),
            "categorical" => Ok(Segment::categorical(*width)),
            other => Err(PyValueError::new_err(format!(
                "unknown segment kind {other:?} (expected \"continuous\" or \"categorical\")",
            ))),
        })
        .collect()
}

/// Python-visible CondSampler class.
///
/// Owns its RNG, so one instance per consuming process/worker; the Rust API
/// underneath stays shareable for in-process Rust callers.
#[pyclass(name = "CondSampler")]
struct PyCondSampler {
    inner: CondSampler,
    rng: SmallRng,
}

#[pymethods]
impl PyCondSampler {
    #[new]
    #[pyo3(signature = (matrix, layout, seed = 42))]
    fn new(
        py: Python<'_>,
        matrix: PyReadonlyArray2<'_, f32>,
        layout: Vec<(String, usize)>,
        seed: u64,
    ) -> PyResult<Self> {
        let segments = parse_layout(&layout)?;
        let shape = matrix.shape();
        let (num_rows, num_cols) = (shape[0], shape[1]);
        let values: Vec<f32> = matrix.as_array().iter().copied().collect();

        let encoded = EncodedMatrix::new(values, num_rows, num_cols)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        let inner = py
            .detach(|| CondSampler::fit(&encoded, &segments))
            .map_err(|e| PyRuntimeError::new_err(format!("Failed to fit sampler: {e}")))?;

        Ok(Self {
            inner,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Draw a balanced conditional batch. Returns a dict of numpy arrays
    /// (`cond`, `mask`, `column_ids`, `category_ids`), or None when the
    /// model has no modeled columns.
    fn sample_balanced<'py>(
        &mut self,
        py: Python<'py>,
        batch: usize,
    ) -> PyResult<Option<Bound<'py, PyDict>>> {
        let drawn = self
            .inner
            .sample_balanced(&mut self.rng, batch)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        match drawn {
            Some(batch) => Ok(Some(batch_to_dict(py, batch)?)),
            None => Ok(None),
        }
    }

    /// Draw an empirical conditional batch as a `[batch, cond_dim]` numpy
    /// array, or None when the model has no modeled columns.
    fn sample_empirical<'py>(
        &mut self,
        py: Python<'py>,
        batch: usize,
    ) -> PyResult<Option<Bound<'py, PyArray2<f32>>>> {
        let cond_dim = self.inner.cond_dim();
        let drawn = self
            .inner
            .sample_empirical(&mut self.rng, batch)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        match drawn {
            Some(cond) => Ok(Some(
                PyArray1::from_vec(py, cond).reshape([batch, cond_dim])?,
            )),
            None => Ok(None),
        }
    }

    /// A whole batch conditioned on one fixed (column, category) pair, as a
    /// `[batch, cond_dim]` numpy array.
    fn condvec_for_category<'py>(
        &self,
        py: Python<'py>,
        column: usize,
        category: usize,
        batch: usize,
    ) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let cond = self
            .inner
            .condvec_for_category(column, category, batch)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        Ok(PyArray1::from_vec(py, cond).reshape([batch, self.inner.cond_dim()])?)
    }

    /// For each `(column, category)` condition, one matching training-row id.
    fn sample_rows_matching<'py>(
        &mut self,
        py: Python<'py>,
        conditions: Vec<(u32, u32)>,
    ) -> PyResult<Bound<'py, PyArray1<u32>>> {
        let rows = self
            .inner
            .sample_rows_matching(&mut self.rng, &conditions)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        Ok(PyArray1::from_vec(py, rows))
    }

    /// `n` uniformly drawn training-row ids, or None when the model was fit
    /// on zero rows.
    fn sample_rows_uniform<'py>(
        &mut self,
        py: Python<'py>,
        n: usize,
    ) -> PyResult<Option<Bound<'py, PyArray1<u32>>>> {
        let rows = self
            .inner
            .sample_rows_uniform(&mut self.rng, n)
            .map_err(|e| PyRuntimeError::new_err(format!("{e}")))?;
        Ok(rows.map(|rows| PyArray1::from_vec(py, rows)))
    }

    /// Width of the conditional vector space.
    fn cond_dim(&self) -> usize {
        self.inner.cond_dim()
    }

    /// Number of modeled columns.
    fn num_columns(&self) -> usize {
        self.inner.num_columns()
    }

    /// Number of training rows the model was fit on.
    fn num_rows(&self) -> usize {
        self.inner.num_rows()
    }

    /// The `(offset, categories)` pairs of the modeled columns.
    fn columns(&self) -> Vec<(usize, usize)> {
        self.inner
            .columns()
            .iter()
            .map(|c| (c.offset, c.categories))
            .collect()
    }
}

/// Register the condtab Python module.
#[pymodule]
fn condtab(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCondSampler>()?;
    Ok(())
}
