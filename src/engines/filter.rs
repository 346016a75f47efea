//! Gaussian blur, separable or as a single 2-D convolution.
//!
//! Coefficients are computed on the host and uploaded per request; the
//! upload is released once the dispatch has finished.

use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::types::{ChannelLayout, EdgeMode, FilterMode, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlurKernel {
    Horizontal,
    Vertical,
    TwoD,
}

impl KernelSet for BlurKernel {
    const PROGRAM: Program = Program::Filter;

    fn all() -> &'static [Self] {
        &[BlurKernel::Horizontal, BlurKernel::Vertical, BlurKernel::TwoD]
    }

    fn entry_point(self) -> &'static str {
        match self {
            BlurKernel::Horizontal => "horizontal_conv",
            BlurKernel::Vertical => "vertical_conv",
            BlurKernel::TwoD => "convolution_2d",
        }
    }
}

const SAMPLER: (EdgeMode, FilterMode) = (EdgeMode::ClampToEdge, FilterMode::Nearest);

fn validate(sigma: f32, window: usize) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ValidationError::OutOfRange {
            name: "sigma",
            value: sigma as f64,
            min: 0.0,
            max: f64::MAX,
        }
        .into());
    }
    if window % 2 == 0 {
        return Err(ValidationError::EvenWindow(window).into());
    }
    Ok(())
}

/// Sampled 1-D Gaussian of `window` taps, normalised to sum to one.
pub fn gaussian_1d(sigma: f32, window: usize) -> Vec<f32> {
    let radius = (window as i64 - 1) / 2;
    let denom = 2.0 * sigma * sigma;
    let raw: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Row-major `window × window` Gaussian, normalised to sum to one.
pub fn gaussian_2d(sigma: f32, window: usize) -> Vec<f32> {
    let line = gaussian_1d(sigma, window);
    line.iter()
        .flat_map(|&wy| line.iter().map(move |&wx| wx * wy))
        .collect()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ConvUniform {
    radius: i32,
    window: i32,
    _pad: [i32; 2],
}

impl ConvUniform {
    fn new(window: usize) -> Self {
        Self {
            radius: (window as i32 - 1) / 2,
            window: window as i32,
            _pad: [0; 2],
        }
    }
}

/// The blur engine.
#[derive(Debug)]
pub struct Filter {
    exec: Executor<BlurKernel>,
}

impl Filter {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
        })
    }

    /// Separable blur: horizontal pass, then vertical, chained on the device.
    pub fn gauss(&self, sigma: f32, window: usize, src: &ImObject) -> Result<ImPtr> {
        validate(sigma, window)?;
        let weights = gaussian_1d(sigma, window);
        let env = self.exec.env();
        let buffer = env.allocate_buffer(
            wgpu::BufferUsages::STORAGE,
            (weights.len() * std::mem::size_of::<f32>()) as u64,
            Some(bytemuck::cast_slice(&weights)),
        )?;
        let conv = ConvUniform::new(window);
        let size = src.size();
        log::debug!("Gaussian blur {} sigma {} window {}", size, sigma, window);

        let tmp = self.exec.output(src, size, WriteMode::NoBuffer)?;
        let args = self
            .exec
            .bind_common(src, &tmp, SAMPLER)?
            .uniform(&conv)?
            .buffer(&buffer);
        let token = self
            .exec
            .run_async(BlurKernel::Horizontal, &args, size, None)?;

        let dst = self.exec.output(src, size, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(&tmp, &dst, SAMPLER)?
            .uniform(&conv)?
            .buffer(&buffer);
        self.exec
            .run_blocking(BlurKernel::Vertical, &args, size, Some(&token))?;
        drop(args);
        drop(buffer);
        Ok(Arc::new(dst))
    }

    /// Blur with the full 2-D kernel in one dispatch.
    pub fn gauss_2d(&self, sigma: f32, window: usize, src: &ImObject) -> Result<ImPtr> {
        validate(sigma, window)?;
        let weights = gaussian_2d(sigma, window);
        let side = window as u32;
        let coeffs = self.exec.env().allocate_image(
            Size::new(side, side),
            Some(&weights),
            ChannelLayout::Single,
        )?;
        let coeff_view = coeffs.create_view(&wgpu::TextureViewDescriptor::default());
        let size = src.size();
        log::debug!("Gaussian 2-D blur {} sigma {} window {}", size, sigma, window);

        let dst = self.exec.output(src, size, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(src, &dst, SAMPLER)?
            .uniform(&ConvUniform::new(window))?
            .skip()
            .view(&coeff_view);
        self.exec.run_blocking(BlurKernel::TwoD, &args, size, None)?;
        drop(args);
        drop(coeff_view);
        drop(coeffs);
        Ok(Arc::new(dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    #[test]
    fn test_weights_normalised_and_symmetric() {
        let w = gaussian_1d(1.5, 7);
        assert_eq!(w.len(), 7);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for i in 0..3 {
            assert!((w[i] - w[6 - i]).abs() < 1e-7);
            assert!(w[i] < w[i + 1]);
        }
    }

    #[test]
    fn test_single_tap_is_identity() {
        assert_eq!(gaussian_1d(3.0, 1), vec![1.0]);
    }

    #[test]
    fn test_2d_is_outer_product() {
        let line = gaussian_1d(1.0, 3);
        let grid = gaussian_2d(1.0, 3);
        assert_eq!(grid.len(), 9);
        assert!((grid[4] - line[1] * line[1]).abs() < 1e-7);
        assert!((grid.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            validate(1.0, 4),
            Err(Error::Validation(ValidationError::EvenWindow(4)))
        ));
        assert!(validate(0.0, 3).is_err());
        assert!(validate(1.0, 5).is_ok());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_blur_keeps_solid_colour() {
        use crate::core::image::tests::test_context;
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let filter = Filter::new(&ctx, &registry).unwrap();
        let size = Size::new(20, 20);
        let bytes = [70u8, 140, 210].repeat(400);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        for out in [
            filter.gauss(1.0, 5, &src).unwrap(),
            filter.gauss_2d(1.0, 5, &src).unwrap(),
        ] {
            let worst = out
                .host_bytes(false)
                .unwrap()
                .iter()
                .zip(&bytes)
                .map(|(a, b)| (*a as i32 - *b as i32).abs())
                .max()
                .unwrap_or(0);
            assert!(worst <= 1);
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_separable_matches_2d() {
        use crate::core::image::tests::{gradient, test_context};
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let filter = Filter::new(&ctx, &registry).unwrap();
        let size = Size::new(31, 17);
        let src = ImObject::from_host(&ctx, &gradient(size), size, Gamma::Srgb).unwrap();
        let a = filter.gauss(2.0, 7, &src).unwrap();
        let b = filter.gauss_2d(2.0, 7, &src).unwrap();
        let worst = a
            .host_bytes(true)
            .unwrap()
            .iter()
            .zip(b.host_bytes(true).unwrap())
            .map(|(x, y)| (*x as i32 - *y as i32).abs())
            .max()
            .unwrap_or(0);
        assert!(worst <= 2);
    }
}
