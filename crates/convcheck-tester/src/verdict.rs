//! Outcome of one differential test procedure.

use convcheck_common::{
    AccuracyError, Activation, ConvolutionAlgorithm, ConvolutionShape, Operation, Result,
};
use serde::Serialize;

/// Aggregated result of all iterations of one procedure.
///
/// Serializes to a JSON reproduction record (shape, selectors and seed).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub provider: &'static str,
    pub operation: Operation,
    pub algorithm: ConvolutionAlgorithm,
    pub activation: Activation,
    pub shape: ConvolutionShape,
    pub seed: u64,
    pub iterations: usize,
    /// Median over iterations of the per-iteration max relative error.
    pub median_error: f32,
    /// Largest per-iteration max relative error (NaN if any iteration was NaN).
    pub worst_error: f32,
    pub error_limit: f32,
}

impl Verdict {
    /// The median is strictly below the limit. NaN never passes.
    pub fn passed(&self) -> bool {
        self.median_error < self.error_limit
    }

    /// `Ok(self)` if the verdict passed, otherwise the matching [`AccuracyError`].
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(AccuracyError::MedianAboveLimit {
            provider: self.provider,
            operation: self.operation,
            median: self.median_error,
            limit: self.error_limit,
            iterations: self.iterations,
            seed: self.seed,
        }
        .into())
    }

    /// Single-line JSON record for logs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convcheck_common::{ConvCheckError, Padding, Size2d};

    fn verdict(median_error: f32) -> Verdict {
        Verdict {
            provider: "mock",
            operation: Operation::Output,
            algorithm: ConvolutionAlgorithm::Auto,
            activation: Activation::Relu,
            shape: ConvolutionShape {
                batch_size: 1,
                input_channels: 2,
                output_channels: 3,
                input_size: Size2d::new(4, 4),
                padding: Padding::default(),
                kernel_size: Size2d::new(3, 3),
                subsampling: Size2d::new(1, 1),
            },
            seed: 17,
            iterations: 5,
            median_error,
            worst_error: median_error,
            error_limit: 1e-5,
        }
    }

    #[test]
    fn strictly_below_limit_passes() {
        assert!(verdict(0.0).passed());
        assert!(verdict(9.9e-6).passed());
        assert!(!verdict(1e-5).passed());
        assert!(!verdict(f32::NAN).passed());
    }

    #[test]
    fn failing_verdict_becomes_accuracy_error() {
        let err = verdict(2e-3).into_result().unwrap_err();
        match err {
            ConvCheckError::Accuracy(AccuracyError::MedianAboveLimit { seed, iterations, .. }) => {
                assert_eq!(seed, 17);
                assert_eq!(iterations, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn json_record_carries_reproduction_data() {
        let json = verdict(0.5).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["seed"], 17);
        assert_eq!(value["operation"], "output");
        assert_eq!(value["activation"], "relu");
        assert_eq!(value["shape"]["input_size"]["height"], 4);
    }
}
