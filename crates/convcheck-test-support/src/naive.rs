//! Naive reference convolution kernels
//!
//! Direct loop nests over dense NCHW tensors. They prioritize obviousness
//! over speed and serve as the ground truth the tester compares against.

use convcheck_common::{ConvolutionShape, ReferenceKernels};

/// Loop-nest reference implementation of every [`ReferenceKernels`] routine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveReference;

/// Index helpers shared by the three convolution loop nests.
struct Layout {
    shape: ConvolutionShape,
    out_h: usize,
    out_w: usize,
}

impl Layout {
    fn new(shape: &ConvolutionShape) -> Self {
        let out = shape.output_size();
        Self { shape: *shape, out_h: out.height, out_w: out.width }
    }

    fn input_index(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        let s = &self.shape;
        ((n * s.input_channels + c) * s.input_size.height + y) * s.input_size.width + x
    }

    fn output_index(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        ((n * self.shape.output_channels + c) * self.out_h + y) * self.out_w + x
    }

    fn kernel_index(&self, oc: usize, ic: usize, ky: usize, kx: usize) -> usize {
        let s = &self.shape;
        ((oc * s.input_channels + ic) * s.kernel_size.height + ky) * s.kernel_size.width + kx
    }

    /// Input pixel under kernel tap `(ky, kx)` of output pixel `(oy, ox)`,
    /// or `None` if it falls in the padding.
    fn input_pixel(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<(usize, usize)> {
        let s = &self.shape;
        let y = (oy * s.subsampling.height + ky).checked_sub(s.padding.top)?;
        let x = (ox * s.subsampling.width + kx).checked_sub(s.padding.left)?;
        (y < s.input_size.height && x < s.input_size.width).then_some((y, x))
    }

    /// Every `(oy, ox, ky, kx, iy, ix)` tap that touches a real input pixel.
    fn taps(&self) -> impl Iterator<Item = (usize, usize, usize, usize, usize, usize)> + '_ {
        let k = self.shape.kernel_size;
        (0..self.out_h).flat_map(move |oy| {
            (0..self.out_w).flat_map(move |ox| {
                (0..k.height).flat_map(move |ky| {
                    (0..k.width).filter_map(move |kx| {
                        self.input_pixel(oy, ox, ky, kx).map(|(iy, ix)| (oy, ox, ky, kx, iy, ix))
                    })
                })
            })
        })
    }
}

fn check_len(name: &str, actual: usize, expected: usize) {
    assert_eq!(actual, expected, "{name} length mismatch: expected {expected}, got {actual}");
}

impl ReferenceKernels for NaiveReference {
    fn convolution_output(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        kernel: &[f32],
        bias: &[f32],
        output: &mut [f32],
    ) {
        check_len("input", input.len(), shape.input_len());
        check_len("kernel", kernel.len(), shape.kernel_len());
        check_len("bias", bias.len(), shape.bias_len());
        check_len("output", output.len(), shape.output_len());

        let layout = Layout::new(shape);
        for n in 0..shape.batch_size {
            for oc in 0..shape.output_channels {
                for oy in 0..layout.out_h {
                    for ox in 0..layout.out_w {
                        output[layout.output_index(n, oc, oy, ox)] = bias[oc];
                    }
                }
                for (oy, ox, ky, kx, iy, ix) in layout.taps() {
                    let mut sum = 0.0f32;
                    for ic in 0..shape.input_channels {
                        sum += input[layout.input_index(n, ic, iy, ix)]
                            * kernel[layout.kernel_index(oc, ic, ky, kx)];
                    }
                    output[layout.output_index(n, oc, oy, ox)] += sum;
                }
            }
        }
    }

    fn convolution_input_gradient(
        &self,
        shape: &ConvolutionShape,
        grad_output: &[f32],
        kernel: &[f32],
        grad_input: &mut [f32],
    ) {
        check_len("grad_output", grad_output.len(), shape.output_len());
        check_len("kernel", kernel.len(), shape.kernel_len());
        check_len("grad_input", grad_input.len(), shape.input_len());

        let layout = Layout::new(shape);
        grad_input.fill(0.0);
        for n in 0..shape.batch_size {
            for (oy, ox, ky, kx, iy, ix) in layout.taps() {
                for ic in 0..shape.input_channels {
                    let mut sum = 0.0f32;
                    for oc in 0..shape.output_channels {
                        sum += grad_output[layout.output_index(n, oc, oy, ox)]
                            * kernel[layout.kernel_index(oc, ic, ky, kx)];
                    }
                    grad_input[layout.input_index(n, ic, iy, ix)] += sum;
                }
            }
        }
    }

    fn convolution_kernel_gradient(
        &self,
        shape: &ConvolutionShape,
        input: &[f32],
        grad_output: &[f32],
        grad_kernel: &mut [f32],
    ) {
        check_len("input", input.len(), shape.input_len());
        check_len("grad_output", grad_output.len(), shape.output_len());
        check_len("grad_kernel", grad_kernel.len(), shape.kernel_len());

        let layout = Layout::new(shape);
        grad_kernel.fill(0.0);
        for n in 0..shape.batch_size {
            for (oy, ox, ky, kx, iy, ix) in layout.taps() {
                for oc in 0..shape.output_channels {
                    let g = grad_output[layout.output_index(n, oc, oy, ox)];
                    for ic in 0..shape.input_channels {
                        grad_kernel[layout.kernel_index(oc, ic, ky, kx)] +=
                            g * input[layout.input_index(n, ic, iy, ix)];
                    }
                }
            }
        }
    }

    fn relu_output(&self, batch_size: usize, image_len: usize, data: &mut [f32], negative_slope: f32) {
        check_len("relu data", data.len(), batch_size * image_len);
        for value in data.iter_mut() {
            if *value < 0.0 {
                *value *= negative_slope;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convcheck_common::{Padding, Size2d};

    fn shape(
        batch: usize,
        c_in: usize,
        c_out: usize,
        input: (usize, usize),
        padding: Padding,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> ConvolutionShape {
        ConvolutionShape {
            batch_size: batch,
            input_channels: c_in,
            output_channels: c_out,
            input_size: Size2d::new(input.0, input.1),
            padding,
            kernel_size: Size2d::new(kernel.0, kernel.1),
            subsampling: Size2d::new(stride.0, stride.1),
        }
    }

    #[test]
    fn output_of_ones_counts_taps_plus_bias() {
        let s = shape(1, 2, 1, (3, 3), Padding::uniform(1), (3, 3), (1, 1));
        let input = vec![1.0; s.input_len()];
        let kernel = vec![1.0; s.kernel_len()];
        let mut output = vec![f32::NAN; s.output_len()];
        NaiveReference.convolution_output(&s, &input, &kernel, &[0.5], &mut output);

        // Corners see 2x2 real pixels, edges 2x3, the center 3x3; two channels each.
        let expected = [8.5, 12.5, 8.5, 12.5, 18.5, 12.5, 8.5, 12.5, 8.5];
        assert_eq!(output, expected);
    }

    #[test]
    fn strided_output_picks_subsampled_pixels() {
        let s = shape(1, 1, 1, (4, 4), Padding::default(), (1, 1), (2, 2));
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut output = vec![0.0; s.output_len()];
        NaiveReference.convolution_output(&s, &input, &[2.0], &[0.0], &mut output);
        assert_eq!(output, [0.0, 4.0, 16.0, 20.0]);
    }

    #[test]
    fn gradients_satisfy_adjoint_identity() {
        // <conv(x, k), g> == <x, input_grad(g, k)> == <k, kernel_grad(x, g)>
        let s = shape(2, 3, 2, (5, 4), Padding::new(1, 0, 2, 1), (3, 2), (2, 1));
        let x: Vec<f32> = (0..s.input_len()).map(|i| ((i * 7) % 11) as f32 * 0.1 - 0.5).collect();
        let k: Vec<f32> = (0..s.kernel_len()).map(|i| ((i * 5) % 7) as f32 * 0.2 - 0.6).collect();
        let g: Vec<f32> = (0..s.output_len()).map(|i| ((i * 3) % 5) as f32 * 0.3 - 0.4).collect();
        let zero_bias = vec![0.0; s.bias_len()];

        let mut y = vec![0.0; s.output_len()];
        NaiveReference.convolution_output(&s, &x, &k, &zero_bias, &mut y);
        let mut gx = vec![0.0; s.input_len()];
        NaiveReference.convolution_input_gradient(&s, &g, &k, &mut gx);
        let mut gk = vec![0.0; s.kernel_len()];
        NaiveReference.convolution_kernel_gradient(&s, &x, &g, &mut gk);

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(p, q)| p * q).sum::<f32>();
        let forward = dot(&y, &g);
        assert!((forward - dot(&x, &gx)).abs() < 1e-3, "{forward} vs {}", dot(&x, &gx));
        assert!((forward - dot(&k, &gk)).abs() < 1e-3, "{forward} vs {}", dot(&k, &gk));
    }

    #[test]
    fn relu_zeroes_negatives_and_keeps_positives() {
        let mut data = [-1.0f32, 0.0, 2.5, -0.1];
        NaiveReference.relu_output(2, 2, &mut data, 0.0);
        assert_eq!(data, [0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn leaky_relu_scales_negatives() {
        let mut data = [-2.0f32, 3.0];
        NaiveReference.relu_output(1, 2, &mut data, 0.25);
        assert_eq!(data, [-0.5, 3.0]);
    }

    #[test]
    #[should_panic(expected = "bias length mismatch")]
    fn output_rejects_wrong_bias_length() {
        let s = shape(1, 1, 2, (4, 4), Padding::default(), (3, 3), (1, 1));
        let mut output = vec![0.0; s.output_len()];
        NaiveReference.convolution_output(&s, &[0.0; 16], &[0.0; 18], &[0.0], &mut output);
    }
}
