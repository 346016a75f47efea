//! Colour space conversion.
//!
//! Spaces form a small graph with sRGB as the hub. Only direct edges are
//! converted; anything else has to be requested as two calls through sRGB.

use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::types::{ColorSpace, EdgeMode, FilterMode, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConvKernel {
    SrgbToYcbcr,
    YcbcrToSrgb,
    SrgbToHsv,
    HsvToSrgb,
    SrgbToHsl,
    HslToSrgb,
    HslToHsv,
    HsvToHsl,
    SrgbToCieXyz,
    CieXyzToSrgb,
    CieXyzToCieLab,
    CieLabToCieXyz,
}

impl KernelSet for ConvKernel {
    const PROGRAM: Program = Program::Converser;

    fn all() -> &'static [Self] {
        use ConvKernel::*;
        &[
            SrgbToYcbcr,
            YcbcrToSrgb,
            SrgbToHsv,
            HsvToSrgb,
            SrgbToHsl,
            HslToSrgb,
            HslToHsv,
            HsvToHsl,
            SrgbToCieXyz,
            CieXyzToSrgb,
            CieXyzToCieLab,
            CieLabToCieXyz,
        ]
    }

    fn entry_point(self) -> &'static str {
        match self {
            ConvKernel::SrgbToYcbcr => "srgb_to_ycbcr",
            ConvKernel::YcbcrToSrgb => "ycbcr_to_srgb",
            ConvKernel::SrgbToHsv => "srgb_to_hsv",
            ConvKernel::HsvToSrgb => "hsv_to_srgb",
            ConvKernel::SrgbToHsl => "srgb_to_hsl",
            ConvKernel::HslToSrgb => "hsl_to_srgb",
            ConvKernel::HslToHsv => "hsl_to_hsv",
            ConvKernel::HsvToHsl => "hsv_to_hsl",
            ConvKernel::SrgbToCieXyz => "srgb_to_ciexyz",
            ConvKernel::CieXyzToSrgb => "ciexyz_to_srgb",
            ConvKernel::CieXyzToCieLab => "ciexyz_to_cielab",
            ConvKernel::CieLabToCieXyz => "cielab_to_ciexyz",
        }
    }
}

/// Luma weights (Kr, Kg, Kb) of a YCbCr variant.
pub fn luma_weights(space: ColorSpace) -> Option<[f32; 3]> {
    match space {
        ColorSpace::Ycc601 => Some([0.299, 0.587, 0.114]),
        ColorSpace::Ycc709 => Some([0.2126, 0.7152, 0.0722]),
        ColorSpace::Ycc2020 => Some([0.2627, 0.678, 0.0593]),
        _ => None,
    }
}

/// Spaces `from` converts to directly.
pub fn targets(from: ColorSpace) -> &'static [ColorSpace] {
    use ColorSpace::*;
    match from {
        Srgb => &[Ycc601, Ycc709, Ycc2020, Hsv, Hsl, CieXyz],
        Ycc601 | Ycc709 | Ycc2020 => &[Srgb],
        Hsv => &[Srgb, Hsl],
        Hsl => &[Srgb, Hsv],
        CieXyz => &[Srgb, CieLab],
        CieLab => &[CieXyz],
    }
}

/// Channel that carries lightness in `space`, for single-channel contrast.
pub fn lightness_channel(space: ColorSpace) -> usize {
    match space {
        ColorSpace::Hsv | ColorSpace::Hsl => 2,
        _ => 0,
    }
}

fn kernel_for(from: ColorSpace, to: ColorSpace) -> std::result::Result<ConvKernel, ValidationError> {
    use ColorSpace::*;
    let kernel = match (from, to) {
        (Srgb, Ycc601 | Ycc709 | Ycc2020) => ConvKernel::SrgbToYcbcr,
        (Ycc601 | Ycc709 | Ycc2020, Srgb) => ConvKernel::YcbcrToSrgb,
        (Srgb, Hsv) => ConvKernel::SrgbToHsv,
        (Hsv, Srgb) => ConvKernel::HsvToSrgb,
        (Srgb, Hsl) => ConvKernel::SrgbToHsl,
        (Hsl, Srgb) => ConvKernel::HslToSrgb,
        (Hsl, Hsv) => ConvKernel::HslToHsv,
        (Hsv, Hsl) => ConvKernel::HsvToHsl,
        (Srgb, CieXyz) => ConvKernel::SrgbToCieXyz,
        (CieXyz, Srgb) => ConvKernel::CieXyzToSrgb,
        (CieXyz, CieLab) => ConvKernel::CieXyzToCieLab,
        (CieLab, CieXyz) => ConvKernel::CieLabToCieXyz,
        _ => {
            return Err(ValidationError::UnsupportedConversion {
                from: from.to_string(),
                to: to.to_string(),
                valid: targets(from).iter().map(|s| s.to_string()).collect(),
            })
        }
    };
    Ok(kernel)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LumaUniform {
    kr: f32,
    kg: f32,
    kb: f32,
    _pad: f32,
}

/// The colour conversion engine.
#[derive(Debug)]
pub struct Converser {
    exec: Executor<ConvKernel>,
}

impl Converser {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
        })
    }

    /// Convert `src`, which must be tagged `from`, into `to`.
    pub fn run(
        &self,
        from: ColorSpace,
        to: ColorSpace,
        src: &ImObject,
        mode: WriteMode,
    ) -> Result<ImPtr> {
        if src.space() != from {
            return Err(ValidationError::SpaceMismatch {
                expected: from.to_string(),
                actual: src.space().to_string(),
            }
            .into());
        }
        let kernel = kernel_for(from, to)?;
        let size = src.size();
        let dst = ImObject::empty(self.exec.context(), size, mode, src.gamma(), to)?;
        let args = self
            .exec
            .bind_common(src, &dst, (EdgeMode::None, FilterMode::Nearest))?;
        let args = match luma_weights(from).or(luma_weights(to)) {
            Some([kr, kg, kb]) => args.uniform(&LumaUniform {
                kr,
                kg,
                kb,
                _pad: 0.0,
            })?,
            None => args,
        };
        log::debug!("Convert {} {} -> {}", size, from, to);
        self.exec.run_blocking(kernel, &args, size, None)?;
        Ok(Arc::new(dst))
    }
}
