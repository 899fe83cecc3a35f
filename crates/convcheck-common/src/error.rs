//! Error types for convcheck.
//!
//! Failures fall into three disjoint classes: the harness was misused
//! ([`HarnessError`]), the implementation under test refused or failed a call
//! ([`KernelError`], wrapped with call context in [`ConvCheckError::Candidate`]),
//! or it ran but produced inaccurate numbers ([`AccuracyError`]).

use crate::types::{Activation, CallPhase, Operation};
use thiserror::Error;

/// Main error type for convcheck.
#[derive(Debug, Error)]
pub enum ConvCheckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),

    #[error("Candidate `{provider}` failed during {phase} of {operation}: {source}")]
    Candidate {
        provider: &'static str,
        operation: Operation,
        phase: CallPhase,
        #[source]
        source: KernelError,
    },

    #[error("Accuracy error: {0}")]
    Accuracy(#[from] AccuracyError),
}

/// Defects in how the tester itself was configured or invoked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HarnessError {
    #[error("Unsupported activation for {operation}: {activation}")]
    UnsupportedActivation { operation: Operation, activation: Activation },

    #[error("Inference requires batch size 1, got {batch_size}")]
    BatchSizeNotOne { batch_size: usize },
}

/// Failure reported by an implementation under test.
///
/// The tester does not interpret these beyond "not success".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("status {status:?} ({context})")]
    Status { status: ConvolutionStatus, context: String },

    #[error("Unsupported configuration: {reason}")]
    Unsupported { reason: String },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("Kernel execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

/// A candidate that ran to completion but missed the error budget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccuracyError {
    #[error(
        "{operation} by `{provider}`: median max relative error {median:e} is not below {limit:e} \
         over {iterations} iterations (seed {seed})"
    )]
    MedianAboveLimit {
        provider: &'static str,
        operation: Operation,
        median: f32,
        limit: f32,
        iterations: usize,
        seed: u64,
    },

    #[error("{operation} by `{provider}`: no error samples were collected")]
    NoSamples { provider: &'static str, operation: Operation },
}

/// Status codes of C-style convolution libraries (subset).
///
/// Candidates that wrap such a library map the raw code through
/// [`check_status`]; every code other than `Success` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ConvolutionStatus {
    Success = 0,
    InvalidBatchSize = 2,
    InvalidChannels = 3,
    InvalidInputSize = 10,
    InvalidInputPadding = 12,
    InvalidKernelSize = 13,
    InvalidOutputSubsampling = 16,
    InvalidActivation = 17,
    UnsupportedAlgorithm = 26,
    UnsupportedTransformStrategy = 27,
    UnsupportedActivation = 28,
    Uninitialized = 50,
    UnsupportedHardware = 51,
    OutOfMemory = 52,
    InsufficientBuffer = 53,
    MisalignedBuffer = 54,
    Unknown = 999,
}

impl ConvolutionStatus {
    pub fn from_raw(code: u32) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::InvalidBatchSize,
            3 => Self::InvalidChannels,
            10 => Self::InvalidInputSize,
            12 => Self::InvalidInputPadding,
            13 => Self::InvalidKernelSize,
            16 => Self::InvalidOutputSubsampling,
            17 => Self::InvalidActivation,
            26 => Self::UnsupportedAlgorithm,
            27 => Self::UnsupportedTransformStrategy,
            28 => Self::UnsupportedActivation,
            50 => Self::Uninitialized,
            51 => Self::UnsupportedHardware,
            52 => Self::OutOfMemory,
            53 => Self::InsufficientBuffer,
            54 => Self::MisalignedBuffer,
            _ => Self::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

/// Result type for convcheck operations.
pub type Result<T> = std::result::Result<T, ConvCheckError>;

/// Result type returned by implementations under test.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Check a raw status code and return an error if it is not success.
pub fn check_status(status: u32, context: &str) -> KernelResult<()> {
    match ConvolutionStatus::from_raw(status) {
        ConvolutionStatus::Success => Ok(()),
        status => Err(KernelError::Status { status, context: context.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_status_accepts_success_only() {
        assert!(check_status(0, "query").is_ok());
        let err = check_status(26, "convolution_output").unwrap_err();
        assert_eq!(
            err,
            KernelError::Status {
                status: ConvolutionStatus::UnsupportedAlgorithm,
                context: "convolution_output".to_string(),
            }
        );
    }

    #[test]
    fn unknown_codes_are_failures() {
        assert_eq!(ConvolutionStatus::from_raw(4242), ConvolutionStatus::Unknown);
        assert!(check_status(4242, "x").is_err());
        assert!(!ConvolutionStatus::Unknown.is_success());
    }
}
