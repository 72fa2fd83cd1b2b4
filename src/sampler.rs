//! Conditional distribution model over the categorical columns of a
//! mode-encoded training matrix.
//!
//! The model is built once from the transformed matrix and its segment
//! layout ([`CondSampler::fit`]) and is strictly read-only afterwards: every
//! sampling call takes `&self` plus a caller-owned RNG, so concurrent
//! training workers can share one model without synchronization.
//!
//! Two sampling strategies share the same column-selection policy (uniform
//! over modeled columns) but pick the category differently:
//! - [`CondSampler::sample_balanced`] draws against a `log(count + 1)`
//!   smoothed distribution, so rare categories are conditioned on far more
//!   often than their raw frequency. Generator minibatches conditioned this
//!   way force the model to represent rare categories adequately.
//! - [`CondSampler::sample_empirical`] draws uniformly from the recorded
//!   per-row category assignments, reproducing each column's true marginal
//!   exactly. Real minibatches conditioned this way keep the discriminator's
//!   notion of "real" faithful to the data.
//!
//! The asymmetry between the two is deliberate.

use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::common::{EncodedMatrix, Segment, SegmentKind};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum CondSamplerError {
    /// The segment widths do not add up to the matrix's column count.
    #[error("layout walks {walked} matrix columns, but the matrix has {expected}")]
    LayoutMismatch { expected: usize, walked: usize },

    /// A modeled column has no observed mass (zero rows, a zero-width
    /// segment, or an all-zero slice).
    #[error("modeled column {column} has no observed category mass")]
    EmptyColumn { column: usize },

    /// A sampling operation was asked for an empty batch.
    #[error("batch size must be at least 1")]
    ZeroBatch,

    #[error("column {column} out of range (model has {num_columns} modeled columns)")]
    ColumnOutOfRange { column: usize, num_columns: usize },

    #[error("category {category} out of range for column {column} ({categories} categories)")]
    CategoryOutOfRange {
        column: usize,
        category: usize,
        categories: usize,
    },

    /// No training row has the requested (column, category) assignment.
    #[error("no training rows observed with category {category} in column {column}")]
    NoMatchingRows { column: usize, category: usize },
}

// ============================================================================
// Modeled Columns
// ============================================================================

/// One categorical column included in the conditional model.
///
/// Offsets address the packed conditional vector space: a disjoint
/// `cond_dim`-wide address space spanning all modeled columns' one-hot
/// blocks, distinct from the original matrix layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeledColumn {
    /// Start of this column's one-hot block inside the conditional vector
    /// space: the running sum of prior modeled columns' category counts.
    pub offset: usize,
    /// Number of categories (the segment width in the source matrix).
    pub categories: usize,
}

// ============================================================================
// Conditional Batch (output of balanced sampling)
// ============================================================================

/// A batch of balanced conditioning draws, ready to concatenate onto the
/// generator's noise input.
///
/// All tensors are flat `Vec<T>` with shapes documented per field.
#[derive(Debug, Clone)]
pub struct CondBatch {
    pub batch_size: usize,
    /// Width of the conditional vector space.
    pub cond_dim: usize,
    /// Number of modeled columns.
    pub num_columns: usize,

    /// One-hot conditional vectors: [B, cond_dim]. Exactly one 1.0 per row,
    /// at `columns[column_ids[i]].offset + category_ids[i]`.
    pub cond: Vec<f32>,
    /// Column masks: [B, num_columns]. Exactly one 1.0 per row.
    pub mask: Vec<f32>,
    /// Chosen modeled-column index per sample: [B].
    pub column_ids: Vec<u32>,
    /// Chosen category index within the chosen column: [B].
    pub category_ids: Vec<u32>,
}

// ============================================================================
// Conditional Sampler
// ============================================================================

/// Smoothed conditional distribution model over the modeled categorical
/// columns of a transformed training matrix.
///
/// Immutable after [`fit`](Self::fit); safe to share across threads.
#[derive(Debug)]
pub struct CondSampler {
    /// (offset, category count) per modeled column, in layout order.
    columns: Vec<ModeledColumn>,
    /// Width of the conditional vector space: sum of all category counts.
    cond_dim: usize,
    /// Number of training rows the model was fit on.
    num_rows: usize,
    /// Widest modeled column; row stride of the shared probability table.
    max_categories: usize,
    /// Smoothed probability table: [num_columns, max_categories], row-major,
    /// zero-padded past each column's category count. The first `categories`
    /// entries of each row sum to 1.
    probs: Vec<f64>,
    /// Per column: the argmax category of every training row, in row order.
    /// Kept in full because empirical sampling draws from this list directly.
    observed: Vec<Vec<u32>>,
    /// Per column, per category: ids of the training rows assigned to it.
    rows_by_category: Vec<Vec<Vec<u32>>>,
}

/// Per-column construction output, packed into the shared tables by `fit`.
struct ColumnModel {
    categories: usize,
    probs: Vec<f64>,
    observed: Vec<u32>,
    rows_by_category: Vec<Vec<u32>>,
}

impl CondSampler {
    /// Build the model from a transformed training matrix and its layout.
    ///
    /// Folds over the segments left to right: a `Continuous` segment marks
    /// its immediately following `Categorical` segment as a mode selector
    /// (advanced past, not modeled); every other `Categorical` segment
    /// becomes a modeled column. Fails if the walked width disagrees with
    /// the matrix's column count, or if any modeled column has no observed
    /// category mass.
    pub fn fit(matrix: &EncodedMatrix, layout: &[Segment]) -> Result<Self, CondSamplerError> {
        // Resolve the [start, start + width) spans of the modeled columns.
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut cursor = 0usize;
        let mut skip_mode_selector = false;
        for segment in layout {
            match segment.kind {
                SegmentKind::Continuous => {
                    cursor += segment.width;
                    skip_mode_selector = true;
                }
                SegmentKind::Categorical => {
                    if skip_mode_selector {
                        skip_mode_selector = false;
                    } else {
                        spans.push((cursor, segment.width));
                    }
                    cursor += segment.width;
                }
            }
        }
        if cursor != matrix.num_cols() {
            return Err(CondSamplerError::LayoutMismatch {
                expected: matrix.num_cols(),
                walked: cursor,
            });
        }

        // Columns are independent; fit them in parallel.
        let models: Vec<ColumnModel> = spans
            .par_iter()
            .enumerate()
            .map(|(column, &(start, width))| fit_column(matrix, column, start, width))
            .collect::<Result<_, _>>()?;

        // Pack the per-column distributions into one fixed-stride table and
        // assign offsets in construction order.
        let max_categories = models.iter().map(|m| m.categories).max().unwrap_or(0);
        let mut columns = Vec::with_capacity(models.len());
        let mut probs = vec![0.0f64; models.len() * max_categories];
        let mut observed = Vec::with_capacity(models.len());
        let mut rows_by_category = Vec::with_capacity(models.len());
        let mut offset = 0usize;
        for (column, model) in models.into_iter().enumerate() {
            columns.push(ModeledColumn {
                offset,
                categories: model.categories,
            });
            offset += model.categories;
            probs[column * max_categories..column * max_categories + model.categories]
                .copy_from_slice(&model.probs);
            observed.push(model.observed);
            rows_by_category.push(model.rows_by_category);
        }

        info!(
            "CondSampler::fit: {} modeled columns, cond_dim={}, {} training rows",
            columns.len(),
            offset,
            matrix.num_rows(),
        );

        Ok(Self {
            columns,
            cond_dim: offset,
            num_rows: matrix.num_rows(),
            max_categories,
            probs,
            observed,
            rows_by_category,
        })
    }

    /// Width of the conditional vector space (sum of all modeled columns'
    /// category counts).
    pub fn cond_dim(&self) -> usize {
        self.cond_dim
    }

    /// Number of modeled columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of training rows the model was fit on.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The modeled columns, in layout order.
    pub fn columns(&self) -> &[ModeledColumn] {
        &self.columns
    }

    /// The smoothed probability row of one modeled column.
    ///
    /// The slice has `max_categories` entries; indices at or past the
    /// column's category count are zero padding.
    ///
    /// # Panics
    /// Panics if `column` is out of bounds.
    pub fn probabilities(&self, column: usize) -> &[f64] {
        let start = column * self.max_categories;
        &self.probs[start..start + self.max_categories]
    }

    /// Draw a balanced conditional batch: per sample, a uniformly chosen
    /// modeled column, a category drawn by inverse CDF against that column's
    /// smoothed distribution, and the matching one-hot/mask encodings.
    ///
    /// Returns `Ok(None)` when the model has no modeled columns — callers
    /// treat that as "no conditioning available", not as failure.
    pub fn sample_balanced<R: Rng>(
        &self,
        rng: &mut R,
        batch: usize,
    ) -> Result<Option<CondBatch>, CondSamplerError> {
        if batch == 0 {
            return Err(CondSamplerError::ZeroBatch);
        }
        let num_columns = self.columns.len();
        if num_columns == 0 {
            return Ok(None);
        }

        let mut cond = vec![0.0f32; batch * self.cond_dim];
        let mut mask = vec![0.0f32; batch * num_columns];
        let mut column_ids = Vec::with_capacity(batch);
        let mut category_ids = Vec::with_capacity(batch);

        for b in 0..batch {
            let column = rng.random_range(0..num_columns);
            let category = self.draw_category(rng, column);
            cond[b * self.cond_dim + self.columns[column].offset + category] = 1.0;
            mask[b * num_columns + column] = 1.0;
            column_ids.push(column as u32);
            category_ids.push(category as u32);
        }

        Ok(Some(CondBatch {
            batch_size: batch,
            cond_dim: self.cond_dim,
            num_columns,
            cond,
            mask,
            column_ids,
            category_ids,
        }))
    }

    /// Draw an empirical conditional batch: per sample, a uniformly chosen
    /// modeled column and a category picked uniformly from that column's
    /// recorded per-row assignments, one-hot encoded into a flat
    /// `[batch, cond_dim]` buffer.
    ///
    /// Returns `Ok(None)` when the model has no modeled columns.
    pub fn sample_empirical<R: Rng>(
        &self,
        rng: &mut R,
        batch: usize,
    ) -> Result<Option<Vec<f32>>, CondSamplerError> {
        if batch == 0 {
            return Err(CondSamplerError::ZeroBatch);
        }
        let num_columns = self.columns.len();
        if num_columns == 0 {
            return Ok(None);
        }

        let mut cond = vec![0.0f32; batch * self.cond_dim];
        for b in 0..batch {
            let column = rng.random_range(0..num_columns);
            let assignments = &self.observed[column];
            let category = assignments[rng.random_range(0..assignments.len())] as usize;
            cond[b * self.cond_dim + self.columns[column].offset + category] = 1.0;
        }
        Ok(Some(cond))
    }

    /// A whole batch conditioned on one fixed (column, category) pair — the
    /// generation-time path where a caller asks for rows carrying a specific
    /// value. Returns flat `[batch, cond_dim]` one-hot rows.
    pub fn condvec_for_category(
        &self,
        column: usize,
        category: usize,
        batch: usize,
    ) -> Result<Vec<f32>, CondSamplerError> {
        if batch == 0 {
            return Err(CondSamplerError::ZeroBatch);
        }
        let modeled = self.check_column_category(column, category)?;
        let mut cond = vec![0.0f32; batch * self.cond_dim];
        for b in 0..batch {
            cond[b * self.cond_dim + modeled.offset + category] = 1.0;
        }
        Ok(cond)
    }

    /// For each `(column, category)` condition, draw one training-row id
    /// uniformly among the rows whose recorded assignment matches. This is
    /// how a training loop pairs conditional vectors with real rows that
    /// satisfy them.
    pub fn sample_rows_matching<R: Rng>(
        &self,
        rng: &mut R,
        conditions: &[(u32, u32)],
    ) -> Result<Vec<u32>, CondSamplerError> {
        let mut rows = Vec::with_capacity(conditions.len());
        for &(column, category) in conditions {
            let (column, category) = (column as usize, category as usize);
            self.check_column_category(column, category)?;
            let candidates = &self.rows_by_category[column][category];
            if candidates.is_empty() {
                return Err(CondSamplerError::NoMatchingRows { column, category });
            }
            rows.push(candidates[rng.random_range(0..candidates.len())]);
        }
        Ok(rows)
    }

    /// Draw `n` training-row ids uniformly, for the unconditioned minibatch
    /// path. Returns `Ok(None)` when the model was fit on zero rows (only
    /// possible when it also has no modeled columns).
    pub fn sample_rows_uniform<R: Rng>(
        &self,
        rng: &mut R,
        n: usize,
    ) -> Result<Option<Vec<u32>>, CondSamplerError> {
        if n == 0 {
            return Err(CondSamplerError::ZeroBatch);
        }
        if self.num_rows == 0 {
            return Ok(None);
        }
        let rows = (0..n)
            .map(|_| rng.random_range(0..self.num_rows) as u32)
            .collect();
        Ok(Some(rows))
    }

    /// Inverse-CDF draw against one column's smoothed probability row: pick
    /// the first index whose cumulative probability exceeds a uniform draw.
    fn draw_category<R: Rng>(&self, rng: &mut R, column: usize) -> usize {
        let k = self.columns[column].categories;
        let start = column * self.max_categories;
        let row = &self.probs[start..start + k];

        let u: f64 = rng.random();
        let mut cumulative = 0.0f64;
        for (i, &p) in row.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return i;
            }
        }
        // Float round-off can leave the cumulative sum a hair below 1.
        k - 1
    }

    fn check_column_category(
        &self,
        column: usize,
        category: usize,
    ) -> Result<ModeledColumn, CondSamplerError> {
        let modeled =
            self.columns
                .get(column)
                .copied()
                .ok_or(CondSamplerError::ColumnOutOfRange {
                    column,
                    num_columns: self.columns.len(),
                })?;
        if category >= modeled.categories {
            return Err(CondSamplerError::CategoryOutOfRange {
                column,
                category,
                categories: modeled.categories,
            });
        }
        Ok(modeled)
    }
}

/// Fit a single modeled column from its `[start, start + width)` slice.
///
/// The per-row category is the position of the maximum value within the
/// slice; ties break to the lowest index. Frequencies are the column-wise
/// sums of the raw slice values, smoothed with `log(count + 1)` and
/// normalized to a distribution.
fn fit_column(
    matrix: &EncodedMatrix,
    column: usize,
    start: usize,
    width: usize,
) -> Result<ColumnModel, CondSamplerError> {
    let num_rows = matrix.num_rows();
    if width == 0 || num_rows == 0 {
        return Err(CondSamplerError::EmptyColumn { column });
    }

    let mut freq = vec![0.0f64; width];
    let mut observed = Vec::with_capacity(num_rows);
    let mut rows_by_category: Vec<Vec<u32>> = vec![Vec::new(); width];

    for row in 0..num_rows {
        let slice = &matrix.row(row)[start..start + width];
        let mut best = 0usize;
        for (i, &v) in slice.iter().enumerate() {
            freq[i] += f64::from(v);
            if v > slice[best] {
                best = i;
            }
        }
        observed.push(best as u32);
        rows_by_category[best].push(row as u32);
    }

    // log(x + 1) keeps zero-frequency categories reachable while compressing
    // heavy skew, so dominant categories don't monopolize the draws.
    let smoothed: Vec<f64> = freq.iter().map(|&f| (f + 1.0).ln()).collect();
    let total: f64 = smoothed.iter().sum();
    if total <= 0.0 {
        return Err(CondSamplerError::EmptyColumn { column });
    }
    let probs = smoothed.iter().map(|&s| s / total).collect();

    Ok(ColumnModel {
        categories: width,
        probs,
        observed,
        rows_by_category,
    })
}
