//! Interfaces to the two collaborators the tester drives: the
//! implementation under test and the naive reference.

use crate::error::KernelResult;
use crate::types::{
    Activation, ConvolutionAlgorithm, ConvolutionShape, ExecutionContext, TransformStrategy,
};

/// Alignment of every workspace and transformed-kernel buffer handed to a candidate.
pub const BUFFER_ALIGNMENT: usize = 64;

/// Byte every workspace holds on entry to a compute call.
pub const SCRATCH_POISON: u8 = 0xA5;

/// Selectors that accompany every call into an implementation under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelRequest {
    pub algorithm: ConvolutionAlgorithm,
    pub activation: Activation,
    pub shape: ConvolutionShape,
    pub context: ExecutionContext,
}

/// Tensors for a forward output or inference call.
#[derive(Debug)]
pub struct OutputTensors<'a> {
    pub input: &'a [f32],
    pub kernel: &'a [f32],
    pub bias: &'a [f32],
    pub output: &'a mut [f32],
}

/// Kernel operand of an inference call.
#[derive(Debug, Clone, Copy)]
pub enum InferenceKernel<'a> {
    /// Plain kernel, transformed inside the call.
    Compute(&'a [f32]),
    /// Kernel previously produced by [`ConvolutionProvider::transform_kernel`].
    Reuse(&'a [u8]),
}

impl InferenceKernel<'_> {
    pub fn strategy(&self) -> TransformStrategy {
        match self {
            InferenceKernel::Compute(_) => TransformStrategy::Compute,
            InferenceKernel::Reuse(_) => TransformStrategy::Reuse,
        }
    }
}

/// An implementation under test.
///
/// Every operation follows a query-then-compute protocol: the `*_workspace_size`
/// query reports how many scratch bytes the compute call needs, then the
/// compute call receives a [`BUFFER_ALIGNMENT`]-aligned buffer of exactly that
/// size filled with [`SCRATCH_POISON`] (or `None` when the size is zero). Output
/// buffers arrive filled with NaN. Any `Err` is treated as a hard failure.
pub trait ConvolutionProvider {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    fn output_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize>;

    fn output(
        &self,
        request: &KernelRequest,
        tensors: OutputTensors<'_>,
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()>;

    fn input_gradient_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize>;

    fn input_gradient(
        &self,
        request: &KernelRequest,
        grad_output: &[f32],
        kernel: &[f32],
        grad_input: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()>;

    fn kernel_gradient_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize>;

    fn kernel_gradient(
        &self,
        request: &KernelRequest,
        input: &[f32],
        grad_output: &[f32],
        grad_kernel: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()>;

    /// Scratch bytes for an inference call using `strategy`.
    fn inference_workspace_size(
        &self,
        request: &KernelRequest,
        strategy: TransformStrategy,
    ) -> KernelResult<usize>;

    /// Bytes needed to hold the transformed kernel.
    fn transformed_kernel_size(&self, request: &KernelRequest) -> KernelResult<usize>;

    /// Transform `kernel` into `transformed` for later `InferenceKernel::Reuse` calls.
    fn transform_kernel(
        &self,
        request: &KernelRequest,
        kernel: &[f32],
        transformed: &mut [u8],
    ) -> KernelResult<()>;

    /// Batch-1 forward convolution.
    fn inference(
        &self,
        request: &KernelRequest,
        input: &[f32],
        kernel: InferenceKernel<'_>,
        bias: &[f32],
        output: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()>;
}

/// Trusted ground-truth routines. These always succeed.
pub trait ReferenceKernels {
    fn convolution_output(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        kernel: &[f32],
        bias: &[f32],
        output: &mut [f32],
    );

    fn convolution_input_gradient(
        &self,
        shape: &ConvolutionShape,
        grad_output: &[f32],
        kernel: &[f32],
        grad_input: &mut [f32],
    );

    fn convolution_kernel_gradient(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        grad_output: &[f32],
        grad_kernel: &mut [f32],
    );

    /// Rectify `batch_size` images of `image_len` elements in place.
    ///
    /// Negative values are multiplied by `negative_slope` (0.0 for plain ReLU).
    fn relu_output(&self, batch_size: usize, image_len: usize, data: &mut [f32], negative_slope: f32);
}
