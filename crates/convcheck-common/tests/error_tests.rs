//! Display and conversion behaviour of the error types.

use convcheck_common::{
    AccuracyError, Activation, CallPhase, ConvCheckError, ConvolutionStatus, HarnessError,
    KernelError, Operation, check_status,
};
use proptest::prelude::*;
use std::error::Error as _;

#[test]
fn harness_errors_convert_into_main_error() {
    let err: ConvCheckError = HarnessError::BatchSizeNotOne { batch_size: 4 }.into();
    assert_eq!(err.to_string(), "Harness error: Inference requires batch size 1, got 4");

    let err: ConvCheckError = HarnessError::UnsupportedActivation {
        operation: Operation::Output,
        activation: Activation::Softmax,
    }
    .into();
    assert_eq!(
        err.to_string(),
        "Harness error: Unsupported activation for convolution output: softmax"
    );
}

#[test]
fn candidate_error_names_provider_phase_and_operation() {
    let source = check_status(ConvolutionStatus::OutOfMemory as u32, "scratch").unwrap_err();
    let err = ConvCheckError::Candidate {
        provider: "simd",
        operation: Operation::KernelGradient,
        phase: CallPhase::WorkspaceQuery,
        source,
    };
    let message = err.to_string();
    assert!(message.starts_with(
        "Candidate `simd` failed during workspace size query of convolution kernel gradient"
    ));
    assert!(message.contains("OutOfMemory"), "{message}");

    let inner = err.source().and_then(|e| e.downcast_ref::<KernelError>());
    assert!(matches!(
        inner,
        Some(KernelError::Status { status: ConvolutionStatus::OutOfMemory, .. })
    ));
}

#[test]
fn accuracy_error_reports_seed_for_reproduction() {
    let err: ConvCheckError = AccuracyError::MedianAboveLimit {
        provider: "simd",
        operation: Operation::Inference,
        median: 2.5e-4,
        limit: 1.0e-5,
        iterations: 7,
        seed: 1234,
    }
    .into();
    let message = err.to_string();
    assert!(message.starts_with("Accuracy error: convolution inference by `simd`"), "{message}");
    assert!(message.contains("over 7 iterations (seed 1234)"), "{message}");
}

#[test]
fn kernel_error_variants_display_reason() {
    let cases = [
        (KernelError::Unsupported { reason: "fp16".into() }, "Unsupported configuration: fp16"),
        (KernelError::InvalidArguments { reason: "null".into() }, "Invalid arguments: null"),
        (KernelError::ExecutionFailed { reason: "trap".into() }, "Kernel execution failed: trap"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

proptest! {
    #[test]
    fn only_status_zero_succeeds(code in any::<u32>()) {
        prop_assert_eq!(check_status(code, "call").is_ok(), code == 0);
    }

    #[test]
    fn known_codes_map_back_to_themselves(code in prop::sample::select(vec![
        0u32, 2, 3, 10, 12, 13, 16, 17, 26, 27, 28, 50, 51, 52, 53, 54,
    ])) {
        prop_assert_eq!(ConvolutionStatus::from_raw(code) as u32, code);
    }
}
