//! Public test procedures.

use crate::cases::{InferenceCase, InputGradientCase, KernelGradientCase, OutputCase};
use crate::rng::TensorRng;
use crate::runner::{DifferentialCase, RunPlan, run_differential};
use crate::shape::ShapeConfig;
use crate::verdict::Verdict;
use convcheck_common::{
    Activation, ConvolutionAlgorithm, ConvolutionProvider, HarnessError, KernelRequest, Operation,
    ReferenceKernels, Result, TesterEnv,
};

/// Differential tester driving one implementation under test against a reference.
///
/// The `test_*` procedures panic with a diagnostic on any failure, so they
/// can be called directly from `#[test]` functions. The `run_*` variants
/// return the failure or the [`Verdict`] instead.
///
/// ```ignore
/// let tester = ConvolutionTester::new(&candidate, &reference)
///     .with_config(ShapeConfig::new().with_input_size(8, 8).with_iterations(5));
/// tester.test_output(ConvolutionAlgorithm::Auto, Activation::Relu);
/// tester.test_inference(ConvolutionAlgorithm::Wt8x8, Activation::Identity, true);
/// ```
pub struct ConvolutionTester<'a, C: ?Sized, R: ?Sized> {
    candidate: &'a C,
    reference: &'a R,
    config: ShapeConfig,
    env: Option<TesterEnv>,
}

impl<'a, C, R> ConvolutionTester<'a, C, R>
where
    C: ConvolutionProvider + ?Sized,
    R: ReferenceKernels + ?Sized,
{
    pub fn new(candidate: &'a C, reference: &'a R) -> Self {
        Self { candidate, reference, config: ShapeConfig::default(), env: None }
    }

    pub fn with_config(mut self, config: ShapeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use explicit environment overrides instead of the process-wide ones.
    pub fn with_env(mut self, env: TesterEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    pub fn run_output(
        &self,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
    ) -> Result<Verdict> {
        let (activation, relu_slope) = resolve_activation(Operation::Output, activation)?;
        self.config.validate()?;
        let case = OutputCase::new(&self.config.shape());
        self.run(case, algorithm, activation, relu_slope)
    }

    pub fn run_input_gradient(
        &self,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
    ) -> Result<Verdict> {
        let (activation, relu_slope) = resolve_activation(Operation::InputGradient, activation)?;
        self.config.validate()?;
        let case = InputGradientCase::new(&self.config.shape());
        self.run(case, algorithm, activation, relu_slope)
    }

    pub fn run_kernel_gradient(
        &self,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
    ) -> Result<Verdict> {
        let (activation, relu_slope) = resolve_activation(Operation::KernelGradient, activation)?;
        self.config.validate()?;
        let case = KernelGradientCase::new(&self.config.shape());
        self.run(case, algorithm, activation, relu_slope)
    }

    /// Batch-1 inference, optionally through a precomputed transformed kernel.
    pub fn run_inference(
        &self,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
        precompute: bool,
    ) -> Result<Verdict> {
        if self.config.batch_size() != 1 {
            return Err(HarnessError::BatchSizeNotOne { batch_size: self.config.batch_size() }.into());
        }
        let (activation, relu_slope) = resolve_activation(Operation::Inference, activation)?;
        self.config.validate()?;
        let case = InferenceCase::new(&self.config.shape(), precompute);
        self.run(case, algorithm, activation, relu_slope)
    }

    pub fn test_output(&self, algorithm: ConvolutionAlgorithm, activation: Activation) {
        assert_passed(self.run_output(algorithm, activation));
    }

    pub fn test_input_gradient(&self, algorithm: ConvolutionAlgorithm, activation: Activation) {
        assert_passed(self.run_input_gradient(algorithm, activation));
    }

    pub fn test_kernel_gradient(&self, algorithm: ConvolutionAlgorithm, activation: Activation) {
        assert_passed(self.run_kernel_gradient(algorithm, activation));
    }

    pub fn test_inference(
        &self,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
        precompute: bool,
    ) {
        assert_passed(self.run_inference(algorithm, activation, precompute));
    }

    fn run<K: DifferentialCase>(
        &self,
        case: K,
        algorithm: ConvolutionAlgorithm,
        activation: Activation,
        relu_slope: Option<f32>,
    ) -> Result<Verdict> {
        let env = self.env.as_ref().unwrap_or_else(|| TesterEnv::global());
        let request = KernelRequest {
            algorithm,
            activation,
            shape: self.config.shape(),
            context: self.config.execution_context(),
        };
        let plan = RunPlan {
            candidate: self.candidate,
            reference: self.reference,
            request,
            relu_slope,
            iterations: env.effective_iterations(self.config.iterations()),
            error_limit: self.config.error_limit(),
            rng: TensorRng::from_seed_or_clock(self.config.seed().or(env.seed)),
        };
        run_differential(case, plan)
    }
}

/// Activation passed to the candidate and the negative slope of the reference
/// ReLU (`None` for identity).
///
/// Operations without a fused activation always run with identity.
fn resolve_activation(
    operation: Operation,
    activation: Activation,
) -> Result<(Activation, Option<f32>)> {
    if !operation.applies_activation() {
        if activation != Activation::Identity {
            log::warn!("{operation} ignores activation {activation}; testing with identity");
        }
        return Ok((Activation::Identity, None));
    }
    match activation {
        Activation::Identity => Ok((activation, None)),
        Activation::Relu => Ok((activation, Some(0.0))),
        other => Err(HarnessError::UnsupportedActivation { operation, activation: other }.into()),
    }
}

#[track_caller]
fn assert_passed(outcome: Result<Verdict>) {
    if let Err(e) = outcome.and_then(Verdict::into_result) {
        panic!("{e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fused_operations_map_relu_to_zero_slope() {
        for operation in [Operation::Output, Operation::Inference] {
            assert_eq!(
                resolve_activation(operation, Activation::Relu).unwrap(),
                (Activation::Relu, Some(0.0))
            );
            assert_eq!(
                resolve_activation(operation, Activation::Identity).unwrap(),
                (Activation::Identity, None)
            );
            assert!(resolve_activation(operation, Activation::Softmax).is_err());
        }
    }

    #[test]
    fn gradients_fall_back_to_identity() {
        for operation in [Operation::InputGradient, Operation::KernelGradient] {
            for activation in [Activation::Identity, Activation::Relu, Activation::Softmax] {
                assert_eq!(
                    resolve_activation(operation, activation).unwrap(),
                    (Activation::Identity, None)
                );
            }
        }
    }
}
