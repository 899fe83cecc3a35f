//! Generic differential test skeleton shared by all four procedures.
//!
//! One run is a single linear pass: workspace query, scratch allocation,
//! `iterations` rounds of generate → reference → candidate → compare, and a
//! median verdict. Any candidate failure ends the run immediately.

use crate::metric::{max_error, median, nan_max};
use crate::rng::{TensorRng, ValueRange};
use crate::scratch::AlignedBuffer;
use crate::verdict::Verdict;
use convcheck_common::{
    AccuracyError, CallPhase, ConvCheckError, ConvolutionProvider, ConvolutionShape, KernelError,
    KernelRequest, KernelResult, Operation, ReferenceKernels, Result,
};

/// Per-operation tensors and calling convention plugged into [`run_differential`].
pub(crate) trait DifferentialCase {
    const OPERATION: Operation;
    /// Range the input-role tensors are drawn from.
    const RANGE: ValueRange;

    fn workspace_size<C>(&self, candidate: &C, request: &KernelRequest) -> KernelResult<usize>
    where
        C: ConvolutionProvider + ?Sized;

    /// Redraw every input-role tensor.
    fn randomize(&mut self, rng: &mut TensorRng);

    /// Fill the buffer the candidate writes with NaN.
    fn poison_output(&mut self);

    fn compute_reference<R>(&mut self, reference: &R, shape: &ConvolutionShape)
    where
        R: ReferenceKernels + ?Sized;

    fn reference_output_mut(&mut self) -> &mut [f32];

    fn invoke<C>(
        &mut self,
        candidate: &C,
        request: &KernelRequest,
        workspace: Option<&mut [u8]>,
    ) -> std::result::Result<(), (CallPhase, KernelError)>
    where
        C: ConvolutionProvider + ?Sized;

    /// `(reference, candidate)` outputs of the last iteration.
    fn outputs(&self) -> (&[f32], &[f32]);
}

/// Everything a run needs besides the case itself.
pub(crate) struct RunPlan<'a, C: ?Sized, R: ?Sized> {
    pub candidate: &'a C,
    pub reference: &'a R,
    pub request: KernelRequest,
    /// Negative slope of the reference ReLU, `None` for identity.
    pub relu_slope: Option<f32>,
    pub iterations: usize,
    pub error_limit: f32,
    pub rng: TensorRng,
}

pub(crate) fn run_differential<K, C, R>(mut case: K, plan: RunPlan<'_, C, R>) -> Result<Verdict>
where
    K: DifferentialCase,
    C: ConvolutionProvider + ?Sized,
    R: ReferenceKernels + ?Sized,
{
    let RunPlan { candidate, reference, request, relu_slope, iterations, error_limit, mut rng } =
        plan;
    let provider = candidate.name();
    let operation = K::OPERATION;
    let candidate_error = |phase: CallPhase, source: KernelError| {
        log::warn!("{provider}: {operation} {phase} failed: {source}");
        ConvCheckError::Candidate { provider, operation, phase, source }
    };

    log::info!(
        "Testing {operation} of `{provider}` (algorithm {}, activation {}, seed {}, {} iterations): {}",
        request.algorithm,
        request.activation,
        rng.seed(),
        iterations,
        request.shape
    );

    let scratch_size = case
        .workspace_size(candidate, &request)
        .map_err(|e| candidate_error(CallPhase::WorkspaceQuery, e))?;
    log::debug!("{provider}: {operation} needs {scratch_size} scratch bytes");
    let mut scratch = AlignedBuffer::zeroed(scratch_size);

    let mut samples = Vec::with_capacity(iterations);
    for iteration in 0..iterations {
        case.randomize(&mut rng);
        case.poison_output();
        scratch.poison();

        case.compute_reference(reference, &request.shape);
        if let Some(slope) = relu_slope {
            let shape = &request.shape;
            reference.relu_output(
                shape.batch_size,
                shape.output_image_len(),
                case.reference_output_mut(),
                slope,
            );
        }

        case.invoke(candidate, &request, scratch.workspace())
            .map_err(|(phase, source)| candidate_error(phase, source))?;

        let (expected, actual) = case.outputs();
        let error = max_error(expected, actual);
        log::debug!("{provider}: {operation} iteration {iteration}: max relative error {error:e}");
        samples.push(error);
    }

    let worst_error = samples.iter().copied().fold(0.0f32, nan_max);
    let median_error =
        median(&mut samples).ok_or(AccuracyError::NoSamples { provider, operation })?;

    let verdict = Verdict {
        provider,
        operation,
        algorithm: request.algorithm,
        activation: request.activation,
        shape: request.shape,
        seed: rng.seed(),
        iterations,
        median_error,
        worst_error,
        error_limit,
    };
    if verdict.passed() {
        log::info!(
            "{operation} of `{provider}` passed: median error {median_error:e} < {error_limit:e}"
        );
    } else {
        log::error!(
            "{operation} of `{provider}` failed: median error {median_error:e} >= {error_limit:e}; \
             reproduce with {}",
            verdict.to_json()
        );
    }
    Ok(verdict)
}
