//! Reference wrapper that counts how often each routine runs.

use convcheck_common::{ConvolutionShape, ReferenceKernels};
use std::cell::Cell;

#[derive(Debug, Default)]
pub struct CountingReference<R> {
    inner: R,
    convolutions: Cell<usize>,
    activations: Cell<usize>,
}

impl<R: ReferenceKernels> CountingReference<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, convolutions: Cell::new(0), activations: Cell::new(0) }
    }

    /// Calls to any of the three convolution routines.
    pub fn convolution_calls(&self) -> usize {
        self.convolutions.get()
    }

    pub fn activation_calls(&self) -> usize {
        self.activations.get()
    }

    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }
}

impl<R: ReferenceKernels> ReferenceKernels for CountingReference<R> {
    fn convolution_output(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        kernel: &[f32],
        bias: &[f32],
        output: &mut [f32],
    ) {
        Self::bump(&self.convolutions);
        self.inner.convolution_output(shape, input, kernel, bias, output);
    }

    fn convolution_input_gradient(
        &self,
        shape: &ConvolutionShape,
        grad_output: &[f32],
        kernel: &[f32],
        grad_input: &mut [f32],
    ) {
        Self::bump(&self.convolutions);
        self.inner.convolution_input_gradient(shape, grad_output, kernel, grad_input);
    }

    fn convolution_kernel_gradient(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        grad_output: &[f32],
        grad_kernel: &mut [f32],
    ) {
        Self::bump(&self.convolutions);
        self.inner.convolution_kernel_gradient(shape, input, grad_output, grad_kernel);
    }

    fn relu_output(&self, batch_size: usize, image_len: usize, data: &mut [f32], negative_slope: f32) {
        Self::bump(&self.activations);
        self.inner.relu_output(batch_size, image_len, data, negative_slope);
    }
}
