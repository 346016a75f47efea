//! Haar wavelet denoising.
//!
//! The source is padded to a power-of-two canvas, decomposed one lifting
//! pass at a time (all horizontal levels, then all vertical levels), soft
//! thresholded, reconstructed in mirror order and cropped back. Every pass
//! reads the state image and writes a scratch image; the active region is
//! then copied back on the device, so no pass ever reads what it writes.

use crate::core::device::Token;
use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::tables::POWER_TWO_MAX;
use crate::core::types::{EdgeMode, FilterMode, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WaveKernel {
    Pad,
    HorizontalHaar,
    VerticalHaar,
    SoftThreshold,
    Crop,
}

impl KernelSet for WaveKernel {
    const PROGRAM: Program = Program::Wavelet;

    fn all() -> &'static [Self] {
        &[
            WaveKernel::Pad,
            WaveKernel::HorizontalHaar,
            WaveKernel::VerticalHaar,
            WaveKernel::SoftThreshold,
            WaveKernel::Crop,
        ]
    }

    fn entry_point(self) -> &'static str {
        match self {
            WaveKernel::Pad => "pad",
            WaveKernel::HorizontalHaar => "horizontal_haar",
            WaveKernel::VerticalHaar => "vertical_haar",
            WaveKernel::SoftThreshold => "soft_threshold",
            WaveKernel::Crop => "crop",
        }
    }
}

/// Wavelet basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Basis {
    #[default]
    Haar,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("haar")
    }
}

impl FromStr for Basis {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "haar" => Ok(Basis::Haar),
            _ => Err(ValidationError::unknown("wavelet basis", s, &["haar"])),
        }
    }
}

/// Direction of one lifting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// One lifting pass over a `full` canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftPass {
    pub axis: Axis,
    /// Extent of the low band along `axis`.
    pub band: u32,
}

impl LiftPass {
    /// One invocation per output pair.
    pub fn grid(&self, full: Size) -> Size {
        match self.axis {
            Axis::Horizontal => Size::new(self.band, full.height),
            Axis::Vertical => Size::new(full.width, self.band),
        }
    }

    /// Top-left region the pass rewrites.
    pub fn region(&self, full: Size) -> Size {
        match self.axis {
            Axis::Horizontal => Size::new(2 * self.band, full.height),
            Axis::Vertical => Size::new(full.width, 2 * self.band),
        }
    }
}

/// Forward passes in dispatch order; the inverse runs them reversed.
pub fn forward_schedule(full: Size) -> Vec<LiftPass> {
    let halvings = |extent: u32, axis: Axis| {
        std::iter::successors(Some(extent / 2), |b| Some(b / 2))
            .take_while(|&b| b >= 1)
            .map(move |band| LiftPass { axis, band })
    };
    halvings(full.width, Axis::Horizontal)
        .chain(halvings(full.height, Axis::Vertical))
        .collect()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LevelUniform {
    band: [i32; 2],
    inverse: u32,
    threshold: f32,
}

/// The wavelet denoise engine.
#[derive(Debug)]
pub struct Wavelet {
    exec: Executor<WaveKernel>,
}

impl Wavelet {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
        })
    }

    /// Denoise `src` by shrinking its detail coefficients by `threshold`.
    pub fn run(&self, basis: Basis, threshold: f32, src: &ImObject) -> Result<ImPtr> {
        let Basis::Haar = basis;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ValidationError::OutOfRange {
                name: "wavelet threshold",
                value: threshold as f64,
                min: 0.0,
                max: f64::MAX,
            }
            .into());
        }
        let size = src.size();
        let tables = self.exec.context().tables();
        let full = match (tables.next_power(size.width), tables.next_power(size.height)) {
            (Some(w), Some(h)) => Size::new(w, h),
            _ => {
                return Err(ValidationError::TooLarge {
                    width: size.width,
                    height: size.height,
                    max: 1 << (POWER_TWO_MAX - 1),
                }
                .into())
            }
        };
        log::debug!("Haar denoise {} on a {} canvas, threshold {}", size, full, threshold);

        let state = self.exec.output(src, full, WriteMode::NoBuffer)?;
        let scratch = self.exec.output(src, full, WriteMode::NoBuffer)?;

        let args = self
            .exec
            .bind_common(src, &state, (EdgeMode::Clamp, FilterMode::Nearest))?;
        let mut token = self.exec.run_async(WaveKernel::Pad, &args, full, None)?;

        let forward = forward_schedule(full);
        for pass in &forward {
            token = self.lift(pass, false, &state, &scratch, full, &token)?;
        }

        let level = LevelUniform {
            band: [0, 0],
            inverse: 0,
            threshold,
        };
        let args = self
            .exec
            .bind_common(&state, &scratch, (EdgeMode::None, FilterMode::Nearest))?
            .uniform(&level)?;
        let shrunk = self
            .exec
            .run_async(WaveKernel::SoftThreshold, &args, full, Some(&token))?;
        token = self.exec.copy_region(&scratch, &state, full, Some(&shrunk))?;

        for pass in forward.iter().rev() {
            token = self.lift(pass, true, &state, &scratch, full, &token)?;
        }

        let dst = self.exec.output(src, size, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(&state, &dst, (EdgeMode::None, FilterMode::Nearest))?;
        self.exec
            .run_blocking(WaveKernel::Crop, &args, size, Some(&token))?;
        Ok(Arc::new(dst))
    }

    fn lift(
        &self,
        pass: &LiftPass,
        inverse: bool,
        state: &ImObject,
        scratch: &ImObject,
        full: Size,
        after: &Token,
    ) -> Result<Token> {
        let (kernel, band) = match pass.axis {
            Axis::Horizontal => (WaveKernel::HorizontalHaar, [pass.band as i32, 0]),
            Axis::Vertical => (WaveKernel::VerticalHaar, [0, pass.band as i32]),
        };
        let level = LevelUniform {
            band,
            inverse: u32::from(inverse),
            threshold: 0.0,
        };
        let args = self
            .exec
            .bind_common(state, scratch, (EdgeMode::None, FilterMode::Nearest))?
            .uniform(&level)?;
        let lifted = self
            .exec
            .run_async(kernel, &args, pass.grid(full), Some(after))?;
        self.exec
            .copy_region(scratch, state, pass.region(full), Some(&lifted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basis() {
        assert_eq!("HAAR".parse::<Basis>().unwrap(), Basis::Haar);
        assert!("db4".parse::<Basis>().is_err());
    }

    #[test]
    fn test_schedule_halves_width_then_height() {
        let passes = forward_schedule(Size::new(8, 4));
        let bands: Vec<(Axis, u32)> = passes.iter().map(|p| (p.axis, p.band)).collect();
        assert_eq!(
            bands,
            vec![
                (Axis::Horizontal, 4),
                (Axis::Horizontal, 2),
                (Axis::Horizontal, 1),
                (Axis::Vertical, 2),
                (Axis::Vertical, 1),
            ]
        );
        assert_eq!(passes[0].grid(Size::new(8, 4)), Size::new(4, 4));
        assert_eq!(passes[3].region(Size::new(8, 4)), Size::new(8, 4));
    }

    #[test]
    fn test_schedule_of_single_pixel_is_empty() {
        assert!(forward_schedule(Size::new(1, 1)).is_empty());
        assert_eq!(forward_schedule(Size::new(1, 16)).len(), 4);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_zero_threshold_is_lossless() {
        use crate::core::image::tests::{gradient, test_context};
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let wavelet = Wavelet::new(&ctx, &registry).unwrap();
        let size = Size::new(37, 22);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = wavelet.run(Basis::Haar, 0.0, &src).unwrap();
        assert_eq!(out.size(), size);
        let worst = out
            .host_bytes(false)
            .unwrap()
            .iter()
            .zip(&bytes)
            .map(|(a, b)| (*a as i32 - *b as i32).abs())
            .max()
            .unwrap_or(0);
        assert!(worst <= 1, "max deviation {}", worst);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_threshold_flattens_noise() {
        use crate::core::image::tests::test_context;
        use crate::core::stats::AGGREGATE;
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let wavelet = Wavelet::new(&ctx, &registry).unwrap();
        let size = Size::new(16, 16);
        let bytes: Vec<u8> = (0..256u32)
            .flat_map(|i| {
                let v = if (i + i / 16) % 2 == 0 { 120 } else { 130 };
                [v, v, v]
            })
            .collect();
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = wavelet.run(Basis::Haar, 0.1, &src).unwrap();
        let stats = out.statistics().unwrap();
        assert!(stats.variance[AGGREGATE] < src.statistics().unwrap().variance[AGGREGATE]);
    }
}
