//! Tensors and calling conventions of the four tested operations.

use crate::rng::{TensorRng, ValueRange};
use crate::runner::DifferentialCase;
use crate::scratch::AlignedBuffer;
use convcheck_common::{
    CallPhase, ConvolutionProvider, ConvolutionShape, InferenceKernel, KernelError, KernelRequest,
    KernelResult, Operation, OutputTensors, ReferenceKernels, TransformStrategy,
};

type CallResult = std::result::Result<(), (CallPhase, KernelError)>;

fn at(phase: CallPhase) -> impl FnOnce(KernelError) -> (CallPhase, KernelError) {
    move |e| (phase, e)
}

// ── forward output ─────────────────────────────────────────────────

pub(crate) struct OutputCase {
    input: Vec<f32>,
    kernel: Vec<f32>,
    bias: Vec<f32>,
    output: Vec<f32>,
    reference_output: Vec<f32>,
}

impl OutputCase {
    pub(crate) fn new(shape: &ConvolutionShape) -> Self {
        Self {
            input: vec![0.0; shape.input_len()],
            kernel: vec![0.0; shape.kernel_len()],
            bias: vec![0.0; shape.bias_len()],
            output: vec![0.0; shape.output_len()],
            reference_output: vec![0.0; shape.output_len()],
        }
    }
}

impl DifferentialCase for OutputCase {
    const OPERATION: Operation = Operation::Output;
    const RANGE: ValueRange = ValueRange::Biased;

    fn workspace_size<C>(&self, candidate: &C, request: &KernelRequest) -> KernelResult<usize>
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate.output_workspace_size(request)
    }

    fn randomize(&mut self, rng: &mut TensorRng) {
        rng.fill(&mut self.input, Self::RANGE);
        rng.fill(&mut self.kernel, Self::RANGE);
        rng.fill(&mut self.bias, Self::RANGE);
    }

    fn poison_output(&mut self) {
        self.output.fill(f32::NAN);
    }

    fn compute_reference<R>(&mut self, reference: &R, shape: &ConvolutionShape)
    where
        R: ReferenceKernels + ?Sized,
    {
        reference.convolution_output(
            shape,
            &self.input,
            &self.kernel,
            &self.bias,
            &mut self.reference_output,
        );
    }

    fn reference_output_mut(&mut self) -> &mut [f32] {
        &mut self.reference_output
    }

    fn invoke<C>(
        &mut self,
        candidate: &C,
        request: &KernelRequest,
        workspace: Option<&mut [u8]>,
    ) -> CallResult
    where
        C: ConvolutionProvider + ?Sized,
    {
        let tensors = OutputTensors {
            input: &self.input,
            kernel: &self.kernel,
            bias: &self.bias,
            output: &mut self.output,
        };
        candidate.output(request, tensors, workspace).map_err(at(CallPhase::Compute))
    }

    fn outputs(&self) -> (&[f32], &[f32]) {
        (&self.reference_output, &self.output)
    }
}

// ── input gradient ─────────────────────────────────────────────────

pub(crate) struct InputGradientCase {
    grad_output: Vec<f32>,
    kernel: Vec<f32>,
    grad_input: Vec<f32>,
    reference_grad_input: Vec<f32>,
}

impl InputGradientCase {
    pub(crate) fn new(shape: &ConvolutionShape) -> Self {
        Self {
            grad_output: vec![0.0; shape.output_len()],
            kernel: vec![0.0; shape.kernel_len()],
            grad_input: vec![0.0; shape.input_len()],
            reference_grad_input: vec![0.0; shape.input_len()],
        }
    }
}

impl DifferentialCase for InputGradientCase {
    const OPERATION: Operation = Operation::InputGradient;
    const RANGE: ValueRange = ValueRange::Unit;

    fn workspace_size<C>(&self, candidate: &C, request: &KernelRequest) -> KernelResult<usize>
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate.input_gradient_workspace_size(request)
    }

    fn randomize(&mut self, rng: &mut TensorRng) {
        rng.fill(&mut self.grad_output, Self::RANGE);
        rng.fill(&mut self.kernel, Self::RANGE);
    }

    fn poison_output(&mut self) {
        self.grad_input.fill(f32::NAN);
    }

    fn compute_reference<R>(&mut self, reference: &R, shape: &ConvolutionShape)
    where
        R: ReferenceKernels + ?Sized,
    {
        reference.convolution_input_gradient(
            shape,
            &self.grad_output,
            &self.kernel,
            &mut self.reference_grad_input,
        );
    }

    fn reference_output_mut(&mut self) -> &mut [f32] {
        &mut self.reference_grad_input
    }

    fn invoke<C>(
        &mut self,
        candidate: &C,
        request: &KernelRequest,
        workspace: Option<&mut [u8]>,
    ) -> CallResult
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate
            .input_gradient(request, &self.grad_output, &self.kernel, &mut self.grad_input, workspace)
            .map_err(at(CallPhase::Compute))
    }

    fn outputs(&self) -> (&[f32], &[f32]) {
        (&self.reference_grad_input, &self.grad_input)
    }
}

// ── kernel gradient ────────────────────────────────────────────────

pub(crate) struct KernelGradientCase {
    input: Vec<f32>,
    grad_output: Vec<f32>,
    grad_kernel: Vec<f32>,
    reference_grad_kernel: Vec<f32>,
}

impl KernelGradientCase {
    pub(crate) fn new(shape: &ConvolutionShape) -> Self {
        Self {
            input: vec![0.0; shape.input_len()],
            grad_output: vec![0.0; shape.output_len()],
            grad_kernel: vec![0.0; shape.kernel_len()],
            reference_grad_kernel: vec![0.0; shape.kernel_len()],
        }
    }
}

impl DifferentialCase for KernelGradientCase {
    const OPERATION: Operation = Operation::KernelGradient;
    const RANGE: ValueRange = ValueRange::Unit;

    fn workspace_size<C>(&self, candidate: &C, request: &KernelRequest) -> KernelResult<usize>
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate.kernel_gradient_workspace_size(request)
    }

    fn randomize(&mut self, rng: &mut TensorRng) {
        rng.fill(&mut self.input, Self::RANGE);
        rng.fill(&mut self.grad_output, Self::RANGE);
    }

    fn poison_output(&mut self) {
        self.grad_kernel.fill(f32::NAN);
    }

    fn compute_reference<R>(&mut self, reference: &R, shape: &ConvolutionShape)
    where
        R: ReferenceKernels + ?Sized,
    {
        reference.convolution_kernel_gradient(
            shape,
            &self.input,
            &self.grad_output,
            &mut self.reference_grad_kernel,
        );
    }

    fn reference_output_mut(&mut self) -> &mut [f32] {
        &mut self.reference_grad_kernel
    }

    fn invoke<C>(
        &mut self,
        candidate: &C,
        request: &KernelRequest,
        workspace: Option<&mut [u8]>,
    ) -> CallResult
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate
            .kernel_gradient(request, &self.input, &self.grad_output, &mut self.grad_kernel, workspace)
            .map_err(at(CallPhase::Compute))
    }

    fn outputs(&self) -> (&[f32], &[f32]) {
        (&self.reference_grad_kernel, &self.grad_kernel)
    }
}

// ── batch-1 inference ──────────────────────────────────────────────

pub(crate) struct InferenceCase {
    forward: OutputCase,
    precompute: bool,
}

impl InferenceCase {
    pub(crate) fn new(shape: &ConvolutionShape, precompute: bool) -> Self {
        Self { forward: OutputCase::new(shape), precompute }
    }

    fn strategy(&self) -> TransformStrategy {
        if self.precompute { TransformStrategy::Reuse } else { TransformStrategy::Compute }
    }
}

impl DifferentialCase for InferenceCase {
    const OPERATION: Operation = Operation::Inference;
    const RANGE: ValueRange = ValueRange::Biased;

    fn workspace_size<C>(&self, candidate: &C, request: &KernelRequest) -> KernelResult<usize>
    where
        C: ConvolutionProvider + ?Sized,
    {
        candidate.inference_workspace_size(request, self.strategy())
    }

    fn randomize(&mut self, rng: &mut TensorRng) {
        self.forward.randomize(rng);
    }

    fn poison_output(&mut self) {
        self.forward.poison_output();
    }

    fn compute_reference<R>(&mut self, reference: &R, shape: &ConvolutionShape)
    where
        R: ReferenceKernels + ?Sized,
    {
        self.forward.compute_reference(reference, shape);
    }

    fn reference_output_mut(&mut self) -> &mut [f32] {
        self.forward.reference_output_mut()
    }

    fn invoke<C>(
        &mut self,
        candidate: &C,
        request: &KernelRequest,
        workspace: Option<&mut [u8]>,
    ) -> CallResult
    where
        C: ConvolutionProvider + ?Sized,
    {
        let OutputCase { input, kernel, bias, output, .. } = &mut self.forward;
        let (input, kernel, bias) = (input.as_slice(), kernel.as_slice(), bias.as_slice());

        if !self.precompute {
            return candidate
                .inference(request, input, InferenceKernel::Compute(kernel), bias, output, workspace)
                .map_err(at(CallPhase::Compute));
        }

        let transformed_size = candidate
            .transformed_kernel_size(request)
            .map_err(at(CallPhase::TransformedKernelQuery))?;
        log::debug!("{}: transformed kernel needs {transformed_size} bytes", candidate.name());
        let mut transformed = AlignedBuffer::zeroed(transformed_size);
        candidate
            .transform_kernel(request, kernel, transformed.as_mut_slice())
            .map_err(at(CallPhase::KernelTransform))?;

        candidate
            .inference(
                request,
                input,
                InferenceKernel::Reuse(transformed.as_slice()),
                bias,
                output,
                workspace,
            )
            .map_err(at(CallPhase::Compute))
    }

    fn outputs(&self) -> (&[f32], &[f32]) {
        self.forward.outputs()
    }
}
