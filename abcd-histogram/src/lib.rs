// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Histogramming engines for the ABCD analysis modules.
//!
//! Counts are `f64` so the exponential time decay used by the spectrum
//! builder keeps fractional counts; any operation that could leave values
//! below a configured floor is followed by [`Histogram::clear_minimum`]
//! (resp. [`Histogram2D::clear_minimum`]) to snap those bins back to zero.
//!
//! A histogram's shape can be reconfigured at runtime; reconfiguring
//! reallocates the counts array and zeroes it.

pub mod histogram;
pub mod histogram2d;

pub use histogram::{Histogram, HistogramConfig};
pub use histogram2d::{Histogram2D, Histogram2DConfig};

/// Errors of histogram construction and shape-sensitive operations.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum HistogramError {
    /// A histogram needs at least one bin per axis.
    #[error("a histogram needs at least one bin")]
    NoBins,
    /// The range upper edge must lie strictly above the lower edge.
    #[error("invalid range: min {min} is not below max {max}")]
    InvalidRange { min: f64, max: f64 },
    /// Binary operations require identical shapes.
    #[error("shape mismatch: {left} bins vs {right} bins")]
    ShapeMismatch { left: usize, right: usize },
    /// The smoothing window width cannot be zero.
    #[error("the smoothing window width cannot be zero")]
    NullWidth,
}
