//! Problem geometry and run controls for one test case.

use convcheck_common::{ConvCheckError, ConvolutionShape, ExecutionContext, Padding, Result, Size2d};
use serde::{Deserialize, Serialize};

/// Default error budget on the median max relative error.
pub const DEFAULT_ERROR_LIMIT: f32 = 1.0e-5;

/// Configuration of one differential test case.
///
/// Every field has a default and can be changed independently with the
/// chained `with_*` setters. Nothing is validated at set time; the runner
/// calls [`ShapeConfig::validate`] when it sizes buffers.
///
/// ```
/// use convcheck_tester::ShapeConfig;
///
/// let config = ShapeConfig::new()
///     .with_input_size(5, 5)
///     .with_input_padding(1, 1, 1, 1)
///     .with_kernel_size(3, 3)
///     .with_output_subsampling(2, 2);
/// assert_eq!((config.output_height(), config.output_width()), (3, 3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    iterations: usize,
    error_limit: f32,
    multithreading: bool,
    seed: Option<u64>,

    batch_size: usize,
    input_channels: usize,
    output_channels: usize,
    input_size: Size2d,
    input_padding: Padding,
    kernel_size: Size2d,
    output_subsampling: Size2d,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            error_limit: DEFAULT_ERROR_LIMIT,
            multithreading: false,
            seed: None,
            batch_size: 1,
            input_channels: 1,
            output_channels: 1,
            input_size: Size2d::new(4, 4),
            input_padding: Padding::default(),
            kernel_size: Size2d::new(3, 3),
            output_subsampling: Size2d::new(1, 1),
        }
    }
}

impl ShapeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // Run controls

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn with_error_limit(mut self, error_limit: f32) -> Self {
        self.error_limit = error_limit;
        self
    }

    pub fn error_limit(&self) -> f32 {
        self.error_limit
    }

    /// Stored and forwarded to the candidate untouched.
    pub fn with_multithreading(mut self, multithreading: bool) -> Self {
        self.multithreading = multithreading;
        self
    }

    pub fn multithreading(&self) -> bool {
        self.multithreading
    }

    /// Pin the random seed; `None` falls back to `CONVCHECK_SEED`, then the wall clock.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    // Geometry

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn with_input_channels(mut self, input_channels: usize) -> Self {
        self.input_channels = input_channels;
        self
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn with_output_channels(mut self, output_channels: usize) -> Self {
        self.output_channels = output_channels;
        self
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_size = Size2d::new(height, width);
        self
    }

    pub fn input_size(&self) -> Size2d {
        self.input_size
    }

    pub fn input_height(&self) -> usize {
        self.input_size.height
    }

    pub fn input_width(&self) -> usize {
        self.input_size.width
    }

    pub fn with_kernel_size(mut self, height: usize, width: usize) -> Self {
        self.kernel_size = Size2d::new(height, width);
        self
    }

    pub fn kernel_size(&self) -> Size2d {
        self.kernel_size
    }

    pub fn kernel_height(&self) -> usize {
        self.kernel_size.height
    }

    pub fn kernel_width(&self) -> usize {
        self.kernel_size.width
    }

    pub fn with_input_padding(mut self, top: usize, right: usize, bottom: usize, left: usize) -> Self {
        self.input_padding = Padding::new(top, right, bottom, left);
        self
    }

    pub fn input_padding(&self) -> Padding {
        self.input_padding
    }

    pub fn with_output_subsampling(mut self, height: usize, width: usize) -> Self {
        self.output_subsampling = Size2d::new(height, width);
        self
    }

    pub fn output_subsampling(&self) -> Size2d {
        self.output_subsampling
    }

    /// Derived output size, recomputed from the current geometry on every call.
    pub fn output_size(&self) -> Size2d {
        self.shape().output_size()
    }

    pub fn output_height(&self) -> usize {
        self.output_size().height
    }

    pub fn output_width(&self) -> usize {
        self.output_size().width
    }

    /// Geometry handed to the candidate and the reference.
    pub fn shape(&self) -> ConvolutionShape {
        ConvolutionShape {
            batch_size: self.batch_size,
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            input_size: self.input_size,
            padding: self.input_padding,
            kernel_size: self.kernel_size,
            subsampling: self.output_subsampling,
        }
    }

    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext { multithreading: self.multithreading }
    }

    /// Reject geometry that cannot be sized into buffers.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch size", self.batch_size),
            ("input channels", self.input_channels),
            ("output channels", self.output_channels),
            ("input height", self.input_size.height),
            ("input width", self.input_size.width),
            ("kernel height", self.kernel_size.height),
            ("kernel width", self.kernel_size.width),
            ("subsampling height", self.output_subsampling.height),
            ("subsampling width", self.output_subsampling.width),
            ("iterations", self.iterations),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("{name} must be > 0")));
        }
        if self.error_limit.is_nan() || self.error_limit <= 0.0 {
            return Err(invalid(format!("error limit must be > 0, got {}", self.error_limit)));
        }
        if self.shape().output_size_checked().is_none() {
            return Err(invalid(format!(
                "kernel {} does not fit padded input {}",
                self.kernel_size,
                self.shape().padded_input_size()
            )));
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ConvCheckError {
    ConvCheckError::Config(reason)
}
