//! Tone adjustment: manual gain, exclusive histogram stretch and adaptive
//! (per-region) stretch.
//!
//! In [`ChannelMode::Single`] only the lightness channel of the source's
//! colour space is touched. That mode is meant for images already converted
//! into a luma/value space that will be converted back, so its output stays
//! sampled-only.

use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::stats::AGGREGATE;
use crate::core::types::{EdgeMode, FilterMode, Size, WriteMode};
use crate::engines::converser::lightness_channel;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ToneKernel {
    Manual,
    ExclusiveHist,
    AdaptiveHistAll,
    AdaptiveHistSingle,
}

impl KernelSet for ToneKernel {
    const PROGRAM: Program = Program::Contraster;

    fn all() -> &'static [Self] {
        &[
            ToneKernel::Manual,
            ToneKernel::ExclusiveHist,
            ToneKernel::AdaptiveHistAll,
            ToneKernel::AdaptiveHistSingle,
        ]
    }

    fn entry_point(self) -> &'static str {
        match self {
            ToneKernel::Manual => "manual",
            ToneKernel::ExclusiveHist => "exclusive_hist",
            ToneKernel::AdaptiveHistAll => "adaptive_hist_all",
            ToneKernel::AdaptiveHistSingle => "adaptive_hist_single",
        }
    }
}

/// Which channels a curve applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// All colour channels share one curve.
    #[default]
    All,
    /// Only the lightness channel of the image's colour space.
    Single,
}

impl ChannelMode {
    fn write_mode(self) -> WriteMode {
        match self {
            ChannelMode::All => WriteMode::WriteBuffer,
            ChannelMode::Single => WriteMode::NoBuffer,
        }
    }
}

/// A tone operation with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneCurve {
    /// Fixed curve for `level` in [-1, 1].
    Manual { level: f32 },
    /// Global stretch clipping `fraction` of the samples at each end.
    Exclusive { fraction: f32 },
    /// Per-region stretch clipping `exclude` samples at each end of a region.
    Adaptive { region: Size, exclude: u32 },
}

/// Gain of the manual contrast curve for `level` in [-1, 1].
pub fn manual_gain(level: f32) -> Result<f32> {
    if !(-1.0..=1.0).contains(&level) {
        return Err(ValidationError::OutOfRange {
            name: "contrast level",
            value: level as f64,
            min: -1.0,
            max: 1.0,
        }
        .into());
    }
    let c = level * 255.0;
    Ok(259.0 * (255.0 + c) / (255.0 * (259.0 - c)))
}

/// Levels left after clipping `exclude` samples from each end of `hist`.
///
/// Fails when nothing is left between the two levels.
pub fn clip_levels(hist: &[u32; 256], exclude: u64) -> Result<(usize, usize)> {
    let mut lo = 0usize;
    let mut left = exclude as i64;
    while left > 0 && lo < 255 {
        left -= hist[lo] as i64;
        lo += 1;
    }
    let mut hi = 255usize;
    left = exclude as i64;
    while left > 0 && hi > 0 {
        left -= hist[hi] as i64;
        hi -= 1;
    }
    if lo >= hi {
        return Err(ValidationError::ExclusionTooAggressive { min: lo, max: hi }.into());
    }
    Ok((lo, hi))
}

/// Sampled-value `(offset, span)` of the display levels `lo..=hi` under `decode`.
pub fn stretch_bounds(decode: &[f32; 256], lo: usize, hi: usize) -> (f32, f32) {
    let offset = decode[lo];
    (offset, decode[hi] - offset)
}

/// Fail unless clipping `exclude` samples at each end leaves part of a `region` block.
pub fn check_region(region: Size, exclude: u32) -> Result<()> {
    region.validate()?;
    let area = region.area();
    if 2 * u64::from(exclude) >= area {
        return Err(ValidationError::RegionTooLarge {
            exclude,
            area: area.min(u64::from(u32::MAX)) as u32,
        }
        .into());
    }
    Ok(())
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CurveUniform {
    gain: [f32; 4],
    offset: [f32; 4],
    norm: [f32; 4],
    region: [u32; 2],
    exclude: u32,
    channel: u32,
}

impl Default for CurveUniform {
    fn default() -> Self {
        Self {
            gain: [1.0; 4],
            offset: [0.0; 4],
            norm: [1.0; 4],
            region: [0; 2],
            exclude: 0,
            channel: 0,
        }
    }
}

/// Colour channels a curve applies to.
fn channels(mode: ChannelMode, src: &ImObject) -> std::ops::Range<usize> {
    match mode {
        ChannelMode::All => 0..3,
        ChannelMode::Single => {
            let c = lightness_channel(src.space());
            c..c + 1
        }
    }
}

/// The contrast engine.
#[derive(Debug)]
pub struct Contraster {
    exec: Executor<ToneKernel>,
}

impl Contraster {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
        })
    }

    fn dispatch(
        &self,
        kernel: ToneKernel,
        src: &ImObject,
        curve: &CurveUniform,
        mode: ChannelMode,
        grid: Option<Size>,
    ) -> Result<ImPtr> {
        let dst = self.exec.output(src, src.size(), mode.write_mode())?;
        let args = self
            .exec
            .bind_common(src, &dst, (EdgeMode::None, FilterMode::Nearest))?
            .uniform(curve)?;
        self.exec
            .run_blocking(kernel, &args, grid.unwrap_or(src.size()), None)?;
        Ok(Arc::new(dst))
    }

    /// Apply the fixed contrast curve for `level` in [-1, 1].
    pub fn manual(&self, src: &ImObject, level: f32, mode: ChannelMode) -> Result<ImPtr> {
        let gain = manual_gain(level)?;
        let mut curve = CurveUniform::default();
        for c in channels(mode, src) {
            curve.gain[c] = gain;
        }
        log::debug!("Manual contrast {} (gain {:.3})", level, gain);
        self.dispatch(ToneKernel::Manual, src, &curve, mode, None)
    }

    /// Stretch the histogram after clipping `fraction` of the samples at each end.
    pub fn exclusive(&self, src: &ImObject, fraction: f32, mode: ChannelMode) -> Result<ImPtr> {
        if !(0.0..0.5).contains(&fraction) {
            return Err(ValidationError::OutOfRange {
                name: "exclusion fraction",
                value: fraction as f64,
                min: 0.0,
                max: 0.5,
            }
            .into());
        }
        let histograms = src.histograms()?;
        let (hist, multiplier) = match mode {
            ChannelMode::All => (&histograms[AGGREGATE], 3),
            ChannelMode::Single => (&histograms[lightness_channel(src.space())], 1),
        };
        let exclude = (multiplier as f64 * src.size().area() as f64 * fraction as f64) as u64;
        let (lo, hi) = clip_levels(hist, exclude)?;

        // Histogram levels are display bytes; the curve runs on sampled values.
        let decode = self
            .exec
            .context()
            .tables()
            .decode_table(src.buffer_encoding());
        let (offset, span) = stretch_bounds(decode, lo, hi);
        let mut curve = CurveUniform::default();
        for c in channels(mode, src) {
            curve.offset[c] = offset;
            curve.norm[c] = span;
        }
        log::debug!("Exclusive stretch [{}..{}] excluding {} samples", lo, hi, exclude);
        self.dispatch(ToneKernel::ExclusiveHist, src, &curve, mode, None)
    }

    /// Stretch each `region` block independently, clipping `exclude` samples per end.
    pub fn adaptive(
        &self,
        src: &ImObject,
        region: Size,
        exclude: u32,
        mode: ChannelMode,
    ) -> Result<ImPtr> {
        check_region(region, exclude)?;
        let size = src.size();
        let grid = Size::new(
            size.width.div_ceil(region.width),
            size.height.div_ceil(region.height),
        );
        let curve = CurveUniform {
            region: region.to_array(),
            exclude,
            channel: lightness_channel(src.space()) as u32,
            ..CurveUniform::default()
        };
        let kernel = match mode {
            ChannelMode::All => ToneKernel::AdaptiveHistAll,
            ChannelMode::Single => ToneKernel::AdaptiveHistSingle,
        };
        log::debug!("Adaptive contrast over {} regions of {}", grid, region);
        self.dispatch(kernel, src, &curve, mode, Some(grid))
    }

    /// Apply any [`ToneCurve`].
    pub fn apply(&self, src: &ImObject, curve: ToneCurve, mode: ChannelMode) -> Result<ImPtr> {
        match curve {
            ToneCurve::Manual { level } => self.manual(src, level, mode),
            ToneCurve::Exclusive { fraction } => self.exclusive(src, fraction, mode),
            ToneCurve::Adaptive { region, exclude } => self.adaptive(src, region, exclude, mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::core::tables::LookupTables;
    use crate::core::types::Gamma;

    #[test]
    fn test_manual_gain() {
        assert!((manual_gain(0.0).unwrap() - 1.0).abs() < 1e-6);
        assert!(manual_gain(0.5).unwrap() > 1.0);
        assert!(manual_gain(-0.5).unwrap() < 1.0);
        assert!(manual_gain(-1.0).unwrap().abs() < 1e-6);
        assert!(matches!(
            manual_gain(1.5),
            Err(Error::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_zero_exclusion_keeps_full_span() {
        let mut hist = [0u32; 256];
        hist[40] = 10;
        hist[200] = 10;
        assert_eq!(clip_levels(&hist, 0).unwrap(), (0, 255));
    }

    #[test]
    fn test_clip_walks_both_ends() {
        let mut hist = [0u32; 256];
        hist[10] = 5;
        hist[100] = 90;
        hist[250] = 5;
        // Every empty bin below the first sample is consumed too.
        assert_eq!(clip_levels(&hist, 5).unwrap(), (11, 249));
    }

    #[test]
    fn test_overaggressive_exclusion() {
        let mut hist = [0u32; 256];
        hist[128] = 100;
        assert!(matches!(
            clip_levels(&hist, 60),
            Err(Error::Validation(ValidationError::ExclusionTooAggressive { .. }))
        ));
    }

    #[test]
    fn test_region_must_outlive_exclusion() {
        assert!(matches!(
            check_region(Size::new(4, 4), 8),
            Err(Error::Validation(ValidationError::RegionTooLarge { exclude: 8, area: 16 }))
        ));
        assert!(check_region(Size::new(4, 4), 7).is_ok());
        assert!(matches!(
            check_region(Size::new(0, 4), 0),
            Err(Error::Validation(ValidationError::EmptyImage))
        ));
        assert!(check_region(Size::new(70000, 70000), 1 << 31).is_ok());
    }

    #[test]
    fn test_full_span_stretch_is_identity() {
        let tables = LookupTables::global();
        for gamma in [Gamma::Identity, Gamma::Srgb] {
            let (offset, span) = stretch_bounds(tables.decode_table(gamma), 0, 255);
            assert_eq!(offset, 0.0);
            assert!((span - 1.0).abs() < 1e-6, "{:?}: {}", gamma, span);
        }
    }

    #[test]
    fn test_srgb_stretch_uses_decoded_levels() {
        let tables = LookupTables::global();
        let (offset, span) = stretch_bounds(tables.decode_table(Gamma::Srgb), 128, 255);
        assert_eq!(offset, tables.srgb_decode[128]);
        assert!(offset < 128.0 / 255.0);
        assert!((offset + span - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_curve_layout() {
        assert_eq!(std::mem::size_of::<CurveUniform>(), 64);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_adaptive_rejects_before_dispatch() {
        use crate::core::image::tests::test_context;
        let Some((ctx, registry)) = test_context() else { return };
        let contraster = Contraster::new(&ctx, &registry).unwrap();
        let src = ImObject::from_host(&ctx, &[0u8; 48], Size::new(4, 4), Gamma::Srgb).unwrap();
        let err = contraster
            .adaptive(&src, Size::new(4, 4), 8, ChannelMode::All)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::RegionTooLarge { exclude: 8, area: 16 })
        ));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_exclusive_zero_is_identity() {
        use crate::core::image::tests::{gradient, test_context};
        let Some((ctx, registry)) = test_context() else { return };
        let contraster = Contraster::new(&ctx, &registry).unwrap();
        let size = Size::new(32, 8);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = contraster.exclusive(&src, 0.0, ChannelMode::All).unwrap();
        assert_eq!(out.host_bytes(false).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_exclusive_zero_is_identity_on_srgb() {
        use crate::core::image::tests::{gradient, test_context};
        let Some((ctx, registry)) = test_context() else { return };
        let contraster = Contraster::new(&ctx, &registry).unwrap();
        let size = Size::new(32, 8);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Srgb).unwrap();
        let out = contraster.exclusive(&src, 0.0, ChannelMode::All).unwrap();
        let worst = out
            .host_bytes(true)
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
    fn test_exclusive_stretches_narrow_range() {
        use crate::core::image::tests::test_context;
        use crate::core::stats::AGGREGATE;
        let Some((ctx, registry)) = test_context() else { return };
        let contraster = Contraster::new(&ctx, &registry).unwrap();
        let size = Size::new(16, 1);
        let bytes: Vec<u8> = (0..16u8).flat_map(|i| [100 + i, 100 + i, 100 + i]).collect();
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = contraster.exclusive(&src, 0.05, ChannelMode::All).unwrap();
        let hist = &out.histograms().unwrap()[AGGREGATE];
        assert!(hist[0] > 0 && hist[255] > 0);
    }
}
