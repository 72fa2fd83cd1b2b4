//! Shared types: column-encoding layout segments and the encoded matrix.
//!
//! A transformed training matrix packs every source column into one or more
//! contiguous spans of matrix columns. Continuous source columns become a
//! single normalized value slot followed by a one-hot block selecting which
//! mixture mode the value was normalized against; categorical source columns
//! become a plain one-hot block. The layout below is the contract the
//! transformation stage hands to [`crate::sampler::CondSampler`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Layout Segments
// ============================================================================

/// What a contiguous span of matrix columns encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A single normalized continuous value. Always immediately followed by
    /// exactly one `Categorical` segment that one-hot encodes which mode the
    /// value was normalized against. That follower is a mode selector, not a
    /// real feature, and is excluded from conditional modeling.
    Continuous,
    /// A one-hot block, one matrix column per category.
    Categorical,
}

/// One contiguous span of matrix columns.
///
/// Segments partition the matrix's column space in order, with no gaps or
/// overlaps: the sum of all widths must equal the matrix's column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Number of matrix columns the span occupies. Must be positive.
    pub width: usize,
}

impl Segment {
    /// A continuous value slot of the given width (normally 1).
    pub fn continuous(width: usize) -> Self {
        debug_assert!(width > 0, "segment width must be positive");
        Self {
            kind: SegmentKind::Continuous,
            width,
        }
    }

    /// A categorical one-hot block with `width` categories.
    pub fn categorical(width: usize) -> Self {
        debug_assert!(width > 0, "segment width must be positive");
        Self {
            kind: SegmentKind::Categorical,
            width,
        }
    }
}

// ============================================================================
// Encoded Matrix
// ============================================================================

/// Error type for matrix construction.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("buffer holds {len} values, but shape [{rows}, {cols}] needs {expected}")]
    ShapeMismatch {
        len: usize,
        rows: usize,
        cols: usize,
        expected: usize,
    },
}

/// Row-major `f32` training matrix produced by the transformation stage.
///
/// Stored as a flat buffer plus shape, so a `[num_rows, num_cols]` matrix
/// arriving from any source (an in-process transform, a numpy array crossing
/// the Python boundary) can be adopted without copying into a nested layout.
#[derive(Debug, Clone)]
pub struct EncodedMatrix {
    values: Vec<f32>,
    num_rows: usize,
    num_cols: usize,
}

impl EncodedMatrix {
    /// Wrap a flat row-major buffer with its shape.
    pub fn new(values: Vec<f32>, num_rows: usize, num_cols: usize) -> Result<Self, MatrixError> {
        let expected = num_rows * num_cols;
        if values.len() != expected {
            return Err(MatrixError::ShapeMismatch {
                len: values.len(),
                rows: num_rows,
                cols: num_cols,
                expected,
            });
        }
        Ok(Self {
            values,
            num_rows,
            num_cols,
        })
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// The flat row-major buffer.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// One row as a slice of `num_cols` values.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.num_cols;
        &self.values[start..start + self.num_cols]
    }

    /// A single cell.
    ///
    /// # Panics
    /// Panics if `row` or `col` is out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(col < self.num_cols);
        self.values[row * self.num_cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_accepts_matching_shape() {
        let m = EncodedMatrix::new(vec![0.0; 12], 3, 4).unwrap();
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.num_cols(), 4);
        assert_eq!(m.row(2).len(), 4);
    }

    #[test]
    fn matrix_rejects_shape_mismatch() {
        let err = EncodedMatrix::new(vec![0.0; 11], 3, 4).unwrap_err();
        match err {
            MatrixError::ShapeMismatch { len, expected, .. } => {
                assert_eq!(len, 11);
                assert_eq!(expected, 12);
            }
        }
    }

    #[test]
    fn matrix_row_and_get_agree() {
        let values: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let m = EncodedMatrix::new(values, 2, 3).unwrap();
        assert_eq!(m.get(1, 2), 5.0);
        assert_eq!(m.row(1), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn segment_constructors_set_kind() {
        assert_eq!(Segment::continuous(1).kind, SegmentKind::Continuous);
        let seg = Segment::categorical(4);
        assert_eq!(seg.kind, SegmentKind::Categorical);
        assert_eq!(seg.width, 4);
    }
}
