use burn::prelude::*;

#[derive(Module, Debug, Clone)]
pub struct BilinearUpsample2d {
    scale_factor: usize,
}

impl BilinearUpsample2d {
    pub fn new(scale_factor: usize) -> Self {
        Self { scale_factor }
    }

    pub fn scale_factor(&self) -> usize {
        self.scale_factor
    }

    /// Bilinear upsample with half-pixel sample centers (corners are not
    /// aligned) and edge-clamped sources.
    /// [B, C, H, W] -> [B, C, H*scale, W*scale]
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.scale_factor == 1 {
            return x;
        }
        let x = self.upsample_axis(x, 2);
        self.upsample_axis(x, 3)
    }

    fn upsample_axis<B: Backend>(&self, x: Tensor<B, 4>, dim: usize) -> Tensor<B, 4> {
        let dims = x.dims();
        let len = dims[dim];
        let scale = self.scale_factor;

        let (prev, next) = if len == 1 {
            (x.clone(), x.clone())
        } else {
            let prev = Tensor::cat(
                vec![x.clone().narrow(dim, 0, 1), x.clone().narrow(dim, 0, len - 1)],
                dim,
            );
            let next = Tensor::cat(
                vec![x.clone().narrow(dim, 1, len - 1), x.clone().narrow(dim, len - 1, 1)],
                dim,
            );
            (prev, next)
        };

        // Output index i*scale + p samples source position i + offset.
        let phases: Vec<Tensor<B, 4>> = (0..scale)
            .map(|p| {
                let offset = (p as f32 + 0.5) / scale as f32 - 0.5;
                if offset < 0.0 {
                    x.clone() * (1.0 + offset) + prev.clone() * (-offset)
                } else {
                    x.clone() * (1.0 - offset) + next.clone() * offset
                }
            })
            .collect();

        // Interleave phases right after `dim`, then fold them into it.
        let stacked: Tensor<B, 5> = Tensor::stack(phases, dim + 1);
        let mut out_dims = dims;
        out_dims[dim] = len * scale;
        stacked.reshape(out_dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_half_pixel_bilinear_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0], [3.0, 4.0]]]], &device);
        let y = BilinearUpsample2d::new(2).forward(x);
        assert_eq!(y.dims(), [1, 1, 4, 4]);

        let expected = [
            1.0, 1.25, 1.75, 2.0, //
            1.5, 1.75, 2.25, 2.5, //
            2.5, 2.75, 3.25, 3.5, //
            3.0, 3.25, 3.75, 4.0,
        ];
        let values = y.into_data().to_vec::<f32>().unwrap();
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_constant_map_stays_constant() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 1, 5], &device);
        let y = BilinearUpsample2d::new(2).forward(x);
        assert_eq!(y.dims(), [2, 3, 2, 10]);
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }
}
