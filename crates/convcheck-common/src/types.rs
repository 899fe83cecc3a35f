//! Shared geometry and selector types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Height × width pair used for input, kernel, output and subsampling sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size2d {
    pub height: usize,
    pub width: usize,
}

impl Size2d {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of elements in one `height × width` plane.
    pub const fn area(&self) -> usize {
        self.height * self.width
    }
}

impl fmt::Display for Size2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Implicit zero padding on each side of the input image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Padding {
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
    pub left: usize,
}

impl Padding {
    pub const fn new(top: usize, right: usize, bottom: usize, left: usize) -> Self {
        Self { top, right, bottom, left }
    }

    /// Same padding on every side.
    pub const fn uniform(pad: usize) -> Self {
        Self { top: pad, right: pad, bottom: pad, left: pad }
    }
}

/// Activation fused into the output of forward and inference convolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Softmax,
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Identity => "identity",
            Activation::Relu => "relu",
            Activation::Softmax => "softmax",
        };
        f.write_str(name)
    }
}

/// Algorithm selector forwarded to the implementation under test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvolutionAlgorithm {
    /// Let the implementation pick.
    #[default]
    Auto,
    /// Fourier transform with 8x8 tiles.
    Ft8x8,
    /// Fourier transform with 16x16 tiles.
    Ft16x16,
    /// Winograd transform with 8x8 tiles.
    Wt8x8,
    /// Winograd transform with 8x8 tiles and half-precision intermediates.
    Wt8x8Fp16,
    /// Im2col-free GEMM lowering.
    ImplicitGemm,
    /// Direct loop nest.
    Direct,
}

impl fmt::Display for ConvolutionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvolutionAlgorithm::Auto => "auto",
            ConvolutionAlgorithm::Ft8x8 => "ft8x8",
            ConvolutionAlgorithm::Ft16x16 => "ft16x16",
            ConvolutionAlgorithm::Wt8x8 => "wt8x8",
            ConvolutionAlgorithm::Wt8x8Fp16 => "wt8x8_fp16",
            ConvolutionAlgorithm::ImplicitGemm => "implicit_gemm",
            ConvolutionAlgorithm::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// How an inference call obtains the transformed kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStrategy {
    /// Transform the plain kernel inside every call.
    #[default]
    Compute,
    /// Only produce the transformed kernel.
    Precompute,
    /// Consume a kernel transformed earlier with `Precompute`.
    Reuse,
}

impl fmt::Display for TransformStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformStrategy::Compute => "compute",
            TransformStrategy::Precompute => "precompute",
            TransformStrategy::Reuse => "reuse",
        };
        f.write_str(name)
    }
}

/// The four convolution operations the tester knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Output,
    InputGradient,
    KernelGradient,
    Inference,
}

impl Operation {
    /// Whether the operation produces activations and therefore honours a fused activation.
    pub const fn applies_activation(&self) -> bool {
        matches!(self, Operation::Output | Operation::Inference)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Output => "convolution output",
            Operation::InputGradient => "convolution input gradient",
            Operation::KernelGradient => "convolution kernel gradient",
            Operation::Inference => "convolution inference",
        };
        f.write_str(name)
    }
}

/// Which call of the query-then-compute protocol was being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    WorkspaceQuery,
    TransformedKernelQuery,
    KernelTransform,
    Compute,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::WorkspaceQuery => "workspace size query",
            CallPhase::TransformedKernelQuery => "transformed kernel size query",
            CallPhase::KernelTransform => "kernel transform",
            CallPhase::Compute => "compute call",
        };
        f.write_str(name)
    }
}

/// Opaque execution hints handed to the implementation under test.
///
/// The tester never interprets these; they exist so a candidate can decide
/// how to schedule its own work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub multithreading: bool,
}

/// Complete geometry of one convolution problem.
///
/// Tensors are dense NCHW. Kernels are laid out as
/// `output_channels × input_channels × kernel_height × kernel_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvolutionShape {
    pub batch_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    pub input_size: Size2d,
    pub padding: Padding,
    pub kernel_size: Size2d,
    pub subsampling: Size2d,
}

impl ConvolutionShape {
    /// Padded input extent, `(top + height + bottom, left + width + right)`.
    pub const fn padded_input_size(&self) -> Size2d {
        Size2d {
            height: self.padding.top + self.input_size.height + self.padding.bottom,
            width: self.padding.left + self.input_size.width + self.padding.right,
        }
    }

    /// Output spatial size from the standard convolution arithmetic.
    ///
    /// Geometry where the kernel exceeds the padded input yields a zero
    /// extent instead of wrapping; [`ConvolutionShape::output_size_checked`]
    /// reports that case as `None`.
    pub fn output_size(&self) -> Size2d {
        let padded = self.padded_input_size();
        Size2d {
            height: output_extent(padded.height, self.kernel_size.height, self.subsampling.height),
            width: output_extent(padded.width, self.kernel_size.width, self.subsampling.width),
        }
    }

    /// Output spatial size, or `None` if any derived dimension would be below 1.
    pub fn output_size_checked(&self) -> Option<Size2d> {
        if self.subsampling.height == 0 || self.subsampling.width == 0 {
            return None;
        }
        let padded = self.padded_input_size();
        let height = padded.height.checked_sub(self.kernel_size.height)? / self.subsampling.height;
        let width = padded.width.checked_sub(self.kernel_size.width)? / self.subsampling.width;
        Some(Size2d { height: height + 1, width: width + 1 })
    }

    /// Elements in the input (and input gradient) tensor.
    pub fn input_len(&self) -> usize {
        self.batch_size * self.input_channels * self.input_size.area()
    }

    /// Elements in the kernel (and kernel gradient) tensor.
    pub fn kernel_len(&self) -> usize {
        self.output_channels * self.input_channels * self.kernel_size.area()
    }

    /// Elements in the bias vector.
    pub fn bias_len(&self) -> usize {
        self.output_channels
    }

    /// Elements in the output (and output gradient) tensor.
    pub fn output_len(&self) -> usize {
        self.batch_size * self.output_channels * self.output_size().area()
    }

    /// Elements in one image of the output tensor.
    pub fn output_image_len(&self) -> usize {
        self.output_channels * self.output_size().area()
    }
}

impl fmt::Display for ConvolutionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.padding;
        write!(
            f,
            "batch {} {}->{} channels, input {} pad [{} {} {} {}], kernel {}, stride {}",
            self.batch_size,
            self.input_channels,
            self.output_channels,
            self.input_size,
            p.top,
            p.right,
            p.bottom,
            p.left,
            self.kernel_size,
            self.subsampling
        )
    }
}

fn output_extent(padded: usize, kernel: usize, stride: usize) -> usize {
    match (padded.checked_sub(kernel), stride) {
        (Some(span), stride) if stride > 0 => span / stride + 1,
        _ => 0,
    }
}
