//! Scripted implementations under test.
//!
//! [`ScriptedCandidate`] computes every operation by delegating to a
//! reference, so with no script it is a perfect candidate. Scripts make it
//! fail a chosen call or corrupt its results in controlled ways.
//!
//! Like a real kernel it checks the scratch it is handed (exact size,
//! [`BUFFER_ALIGNMENT`], every byte [`SCRATCH_POISON`]) and leaves its own
//! garbage behind in it.

use convcheck_common::{
    Activation, BUFFER_ALIGNMENT, CallPhase, ConvolutionProvider, ConvolutionShape,
    ConvolutionStatus, InferenceKernel, KernelError, KernelRequest, KernelResult, OutputTensors,
    ReferenceKernels, SCRATCH_POISON, TransformStrategy, check_status,
};
use std::cell::{Cell, RefCell};

/// Scratch alignment the candidate insists on.
pub const REQUIRED_ALIGNMENT: usize = BUFFER_ALIGNMENT;

/// Byte the candidate leaves in its scratch after a compute call.
const SCRATCH_LEFTOVER: u8 = 0x00;

/// Deliberate defect in how results reach the output buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Write every output element except the last.
    SkipLastElement,
    /// Scale every output element by `1 + relative`.
    Scale { relative: f32 },
    /// Scale every output by 1.5 on each `period`-th compute call (1-based).
    CorruptEvery { period: usize },
    /// Write the output on the first compute call only.
    WriteOnce,
}

/// One call observed by a [`ScriptedCandidate`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub phase: CallPhase,
    pub strategy: Option<TransformStrategy>,
    pub activation: Activation,
    pub workspace_len: Option<usize>,
    pub multithreading: bool,
    /// Whether every output element was NaN on entry; `None` outside compute calls.
    pub output_poisoned: Option<bool>,
}

/// Candidate backed by a reference implementation.
pub struct ScriptedCandidate<R> {
    reference: R,
    workspace_bytes: usize,
    fail_at: Option<CallPhase>,
    fault: Option<Fault>,
    compute_calls: Cell<usize>,
    calls: RefCell<Vec<CallRecord>>,
}

impl<R: ReferenceKernels> ScriptedCandidate<R> {
    /// Candidate that reproduces the reference exactly.
    pub fn perfect(reference: R) -> Self {
        Self {
            reference,
            workspace_bytes: 256,
            fail_at: None,
            fault: None,
            compute_calls: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Scratch bytes reported by every workspace query.
    pub fn with_workspace_bytes(mut self, bytes: usize) -> Self {
        self.workspace_bytes = bytes;
        self
    }

    /// Return a non-success status from every call of `phase`.
    pub fn failing_at(mut self, phase: CallPhase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.borrow().clone()
    }

    /// Compute calls that produced a result.
    pub fn compute_calls(&self) -> usize {
        self.compute_calls.get()
    }

    fn enter(
        &self,
        phase: CallPhase,
        request: &KernelRequest,
        strategy: Option<TransformStrategy>,
    ) -> KernelResult<()> {
        self.record(phase, request, strategy, None, None);
        self.scripted_failure(phase)
    }

    fn record(
        &self,
        phase: CallPhase,
        request: &KernelRequest,
        strategy: Option<TransformStrategy>,
        workspace: Option<&[u8]>,
        output: Option<&[f32]>,
    ) {
        self.calls.borrow_mut().push(CallRecord {
            phase,
            strategy,
            activation: request.activation,
            workspace_len: workspace.map(<[u8]>::len),
            multithreading: request.context.multithreading,
            output_poisoned: output.map(|o| o.iter().all(|v| v.is_nan())),
        });
    }

    fn scripted_failure(&self, phase: CallPhase) -> KernelResult<()> {
        if self.fail_at == Some(phase) {
            return check_status(ConvolutionStatus::UnsupportedAlgorithm as u32, "scripted failure");
        }
        Ok(())
    }

    fn check_workspace(&self, workspace: Option<&[u8]>) -> KernelResult<()> {
        let len = workspace.map_or(0, <[u8]>::len);
        if len != self.workspace_bytes {
            return Err(KernelError::Status {
                status: ConvolutionStatus::InsufficientBuffer,
                context: format!("workspace of {len} bytes, expected {}", self.workspace_bytes),
            });
        }
        let Some(buffer) = workspace else { return Ok(()) };
        if buffer.as_ptr() as usize % REQUIRED_ALIGNMENT != 0 {
            return Err(KernelError::Status {
                status: ConvolutionStatus::MisalignedBuffer,
                context: format!("workspace not {REQUIRED_ALIGNMENT}-byte aligned"),
            });
        }
        if let Some(offset) = buffer.iter().position(|&b| b != SCRATCH_POISON) {
            return Err(KernelError::InvalidArguments {
                reason: format!("workspace byte {offset} is {:#04x}, not poisoned", buffer[offset]),
            });
        }
        Ok(())
    }

    /// Shared compute protocol: record, validate scratch, compute into a
    /// private buffer, deliver through the fault, dirty the scratch.
    fn compute<F>(
        &self,
        request: &KernelRequest,
        strategy: Option<TransformStrategy>,
        workspace: Option<&mut [u8]>,
        output: &mut [f32],
        run: F,
    ) -> KernelResult<()>
    where
        F: FnOnce(&mut [f32]) -> KernelResult<()>,
    {
        self.record(CallPhase::Compute, request, strategy, workspace.as_deref(), Some(output));
        self.scripted_failure(CallPhase::Compute)?;
        self.check_workspace(workspace.as_deref())?;

        let mut result = vec![0.0f32; output.len()];
        run(&mut result)?;
        self.deliver(&result, output);

        if let Some(scratch) = workspace {
            scratch.fill(SCRATCH_LEFTOVER);
        }
        Ok(())
    }

    fn forward(
        &self,
        request: &KernelRequest,
        input: &[f32],
        kernel: &[f32],
        bias: &[f32],
        output: &mut [f32],
    ) -> KernelResult<()> {
        let shape = &request.shape;
        self.reference.convolution_output(shape, input, kernel, bias, output);
        match request.activation {
            Activation::Identity => Ok(()),
            Activation::Relu => {
                self.reference.relu_output(shape.batch_size, shape.output_image_len(), output, 0.0);
                Ok(())
            }
            other => Err(KernelError::Unsupported { reason: format!("activation {other}") }),
        }
    }

    fn deliver(&self, result: &[f32], output: &mut [f32]) {
        let call = self.compute_calls.get() + 1;
        self.compute_calls.set(call);
        match self.fault {
            None => output.copy_from_slice(result),
            Some(Fault::SkipLastElement) => {
                let written = result.len().saturating_sub(1);
                output[..written].copy_from_slice(&result[..written]);
            }
            Some(Fault::Scale { relative }) => {
                for (out, &value) in output.iter_mut().zip(result) {
                    *out = value * (1.0 + relative);
                }
            }
            Some(Fault::CorruptEvery { period }) => {
                let factor = if period > 0 && call % period == 0 { 1.5 } else { 1.0 };
                for (out, &value) in output.iter_mut().zip(result) {
                    *out = value * factor;
                }
            }
            Some(Fault::WriteOnce) => {
                if call == 1 {
                    output.copy_from_slice(result);
                }
            }
        }
    }
}

/// Packed kernel layout: input-channel major, little-endian `f32`.
fn pack_kernel(shape: &ConvolutionShape, kernel: &[f32], packed: &mut [u8]) {
    let taps = shape.kernel_size.area();
    let mut bytes = packed.chunks_exact_mut(4);
    for ic in 0..shape.input_channels {
        for oc in 0..shape.output_channels {
            let start = (oc * shape.input_channels + ic) * taps;
            for (value, chunk) in kernel[start..start + taps].iter().zip(bytes.by_ref()) {
                chunk.copy_from_slice(&value.to_le_bytes());
            }
        }
    }
}

fn unpack_kernel(shape: &ConvolutionShape, packed: &[u8]) -> Vec<f32> {
    let taps = shape.kernel_size.area();
    let mut kernel = vec![0.0f32; shape.kernel_len()];
    let mut values =
        packed.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    for ic in 0..shape.input_channels {
        for oc in 0..shape.output_channels {
            let start = (oc * shape.input_channels + ic) * taps;
            for (slot, value) in kernel[start..start + taps].iter_mut().zip(values.by_ref()) {
                *slot = value;
            }
        }
    }
    kernel
}

fn packed_len(shape: &ConvolutionShape) -> usize {
    shape.kernel_len() * std::mem::size_of::<f32>()
}

impl<R: ReferenceKernels> ConvolutionProvider for ScriptedCandidate<R> {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn output_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize> {
        self.enter(CallPhase::WorkspaceQuery, request, None)?;
        Ok(self.workspace_bytes)
    }

    fn output(
        &self,
        request: &KernelRequest,
        tensors: OutputTensors<'_>,
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()> {
        let OutputTensors { input, kernel, bias, output } = tensors;
        self.compute(request, None, workspace, output, |out| {
            self.forward(request, input, kernel, bias, out)
        })
    }

    fn input_gradient_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize> {
        self.enter(CallPhase::WorkspaceQuery, request, None)?;
        Ok(self.workspace_bytes)
    }

    fn input_gradient(
        &self,
        request: &KernelRequest,
        grad_output: &[f32],
        kernel: &[f32],
        grad_input: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()> {
        self.compute(request, None, workspace, grad_input, |out| {
            self.reference.convolution_input_gradient(&request.shape, grad_output, kernel, out);
            Ok(())
        })
    }

    fn kernel_gradient_workspace_size(&self, request: &KernelRequest) -> KernelResult<usize> {
        self.enter(CallPhase::WorkspaceQuery, request, None)?;
        Ok(self.workspace_bytes)
    }

    fn kernel_gradient(
        &self,
        request: &KernelRequest,
        input: &[f32],
        grad_output: &[f32],
        grad_kernel: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()> {
        self.compute(request, None, workspace, grad_kernel, |out| {
            self.reference.convolution_kernel_gradient(&request.shape, input, grad_output, out);
            Ok(())
        })
    }

    fn inference_workspace_size(
        &self,
        request: &KernelRequest,
        strategy: TransformStrategy,
    ) -> KernelResult<usize> {
        self.enter(CallPhase::WorkspaceQuery, request, Some(strategy))?;
        Ok(self.workspace_bytes)
    }

    fn transformed_kernel_size(&self, request: &KernelRequest) -> KernelResult<usize> {
        let strategy = Some(TransformStrategy::Precompute);
        self.enter(CallPhase::TransformedKernelQuery, request, strategy)?;
        Ok(packed_len(&request.shape))
    }

    fn transform_kernel(
        &self,
        request: &KernelRequest,
        kernel: &[f32],
        transformed: &mut [u8],
    ) -> KernelResult<()> {
        let strategy = Some(TransformStrategy::Precompute);
        self.enter(CallPhase::KernelTransform, request, strategy)?;
        if transformed.len() != packed_len(&request.shape) {
            return check_status(ConvolutionStatus::InsufficientBuffer as u32, "transformed kernel");
        }
        pack_kernel(&request.shape, kernel, transformed);
        Ok(())
    }

    fn inference(
        &self,
        request: &KernelRequest,
        input: &[f32],
        kernel: InferenceKernel<'_>,
        bias: &[f32],
        output: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()> {
        let strategy = Some(kernel.strategy());
        self.compute(request, strategy, workspace, output, |out| {
            if request.shape.batch_size != 1 {
                return check_status(ConvolutionStatus::InvalidBatchSize as u32, "inference");
            }
            match kernel {
                InferenceKernel::Compute(kernel) => self.forward(request, input, kernel, bias, out),
                InferenceKernel::Reuse(packed) => {
                    if packed.len() != packed_len(&request.shape) {
                        return check_status(
                            ConvolutionStatus::InsufficientBuffer as u32,
                            "transformed kernel",
                        );
                    }
                    let kernel = unpack_kernel(&request.shape, packed);
                    self.forward(request, input, &kernel, bias, out)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NaiveReference;
    use convcheck_common::{ConvolutionAlgorithm, ExecutionContext, Padding, Size2d};

    #[repr(C, align(64))]
    struct Scratch([u8; 256]);

    fn request() -> KernelRequest {
        KernelRequest {
            algorithm: ConvolutionAlgorithm::Auto,
            activation: Activation::Identity,
            shape: ConvolutionShape {
                batch_size: 1,
                input_channels: 2,
                output_channels: 3,
                input_size: Size2d::new(4, 4),
                padding: Padding::default(),
                kernel_size: Size2d::new(2, 2),
                subsampling: Size2d::new(1, 1),
            },
            context: ExecutionContext::default(),
        }
    }

    /// Forward output of all-ones tensors; every element is 8.0 unfaulted.
    fn run_ones(
        candidate: &ScriptedCandidate<NaiveReference>,
        output: &mut [f32],
        workspace: Option<&mut [u8]>,
    ) -> KernelResult<()> {
        let request = request();
        let shape = request.shape;
        let tensors = OutputTensors {
            input: &vec![1.0; shape.input_len()],
            kernel: &vec![1.0; shape.kernel_len()],
            bias: &vec![0.0; shape.bias_len()],
            output,
        };
        candidate.output(&request, tensors, workspace)
    }

    #[test]
    fn pack_then_unpack_restores_kernel() {
        let shape = request().shape;
        let kernel: Vec<f32> = (0..shape.kernel_len()).map(|i| i as f32 * 0.5 - 3.0).collect();
        let mut packed = vec![0u8; packed_len(&shape)];
        pack_kernel(&shape, &kernel, &mut packed);
        assert_eq!(&packed[..4], &kernel[0].to_le_bytes());
        // Second packed kernel plane belongs to output channel 1, input channel 0.
        let second = 2 * shape.kernel_size.area();
        assert_eq!(&packed[16..20], &kernel[second].to_le_bytes());
        assert_eq!(unpack_kernel(&shape, &packed), kernel);
    }

    #[test]
    fn scripted_failure_surfaces_as_status() {
        let candidate =
            ScriptedCandidate::perfect(NaiveReference).failing_at(CallPhase::WorkspaceQuery);
        let err = candidate.output_workspace_size(&request()).unwrap_err();
        assert!(matches!(
            err,
            KernelError::Status { status: ConvolutionStatus::UnsupportedAlgorithm, .. }
        ));
        assert_eq!(candidate.calls().len(), 1);
    }

    #[test]
    fn wrong_workspace_size_is_rejected() {
        let candidate = ScriptedCandidate::perfect(NaiveReference).with_workspace_bytes(64);
        let mut output = vec![f32::NAN; request().shape.output_len()];
        let err = run_ones(&candidate, &mut output, None).unwrap_err();
        assert!(matches!(
            err,
            KernelError::Status { status: ConvolutionStatus::InsufficientBuffer, .. }
        ));
        assert_eq!(candidate.compute_calls(), 0);
    }

    #[test]
    fn unpoisoned_workspace_is_rejected() {
        let candidate = ScriptedCandidate::perfect(NaiveReference);
        let mut scratch = Scratch([SCRATCH_POISON; 256]);
        scratch.0[100] = 0x00;
        let mut output = vec![f32::NAN; request().shape.output_len()];

        let err = run_ones(&candidate, &mut output, Some(&mut scratch.0)).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArguments { .. }), "{err}");
        assert!(err.to_string().contains("byte 100"), "{err}");
        assert!(output.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn compute_dirties_poisoned_workspace() {
        let candidate = ScriptedCandidate::perfect(NaiveReference);
        let mut scratch = Scratch([SCRATCH_POISON; 256]);
        let mut output = vec![f32::NAN; request().shape.output_len()];

        run_ones(&candidate, &mut output, Some(&mut scratch.0)).unwrap();
        assert!(output.iter().all(|&v| v == 8.0));
        assert!(scratch.0.iter().all(|&b| b == SCRATCH_LEFTOVER));

        // Reusing the scratch without re-poisoning is caught.
        assert!(run_ones(&candidate, &mut output, Some(&mut scratch.0)).is_err());
        let records = candidate.calls();
        assert_eq!(records[0].output_poisoned, Some(true));
        assert_eq!(records[1].output_poisoned, Some(false));
    }

    #[test]
    fn skip_last_element_leaves_it_untouched() {
        let candidate = ScriptedCandidate::perfect(NaiveReference)
            .with_workspace_bytes(0)
            .with_fault(Fault::SkipLastElement);
        let mut output = vec![-7.0; request().shape.output_len()];
        run_ones(&candidate, &mut output, None).unwrap();

        let (last, rest) = output.split_last().unwrap();
        assert_eq!(*last, -7.0);
        assert!(rest.iter().all(|&v| v == 8.0));
    }

    #[test]
    fn write_once_leaves_later_outputs_untouched() {
        let candidate = ScriptedCandidate::perfect(NaiveReference)
            .with_workspace_bytes(0)
            .with_fault(Fault::WriteOnce);
        let len = request().shape.output_len();

        let mut first = vec![f32::NAN; len];
        run_ones(&candidate, &mut first, None).unwrap();
        assert!(first.iter().all(|&v| v == 8.0));

        let mut second = vec![f32::NAN; len];
        run_ones(&candidate, &mut second, None).unwrap();
        assert!(second.iter().all(|v| v.is_nan()));
        assert_eq!(candidate.compute_calls(), 2);
    }

    #[test]
    fn scale_fault_biases_every_element() {
        let candidate = ScriptedCandidate::perfect(NaiveReference)
            .with_workspace_bytes(0)
            .with_fault(Fault::Scale { relative: 0.5 });
        let mut output = vec![f32::NAN; request().shape.output_len()];
        run_ones(&candidate, &mut output, None).unwrap();
        // 2 channels x 4 taps of 1.0, scaled by 1.5.
        assert!(output.iter().all(|&v| v == 12.0));
        assert_eq!(candidate.compute_calls(), 1);
    }
}
