//! Differential correctness tester for convolution implementations.
//!
//! A [`ConvolutionTester`] feeds identical random tensors to an
//! implementation under test ([`ConvolutionProvider`]) and a trusted naive
//! reference ([`ReferenceKernels`]), measures the worst relative error of each
//! iteration and passes the candidate when the median of those errors stays
//! below the configured limit.
//!
//! Four operations are covered: forward output, input gradient, kernel
//! gradient and batch-1 inference (optionally through a precomputed
//! transformed kernel).
//!
//! [`ConvolutionProvider`]: convcheck_common::ConvolutionProvider
//! [`ReferenceKernels`]: convcheck_common::ReferenceKernels

mod cases;
pub mod metric;
pub mod rng;
mod runner;
pub mod scratch;
pub mod shape;
mod tester;
pub mod verdict;

pub use metric::{max_error, median, relative_error};
pub use rng::{TensorRng, ValueRange};
pub use scratch::{AlignedBuffer, BUFFER_ALIGNMENT, SCRATCH_POISON};
pub use shape::{DEFAULT_ERROR_LIMIT, ShapeConfig};
pub use tester::ConvolutionTester;
pub use verdict::Verdict;
