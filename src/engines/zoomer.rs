//! Resampling.
//!
//! A request is never applied in one dispatch when the factor leaves
//! [0.5, 2]: the image is doubled or halved step by step until the residual
//! factor fits, then the residual is applied. Intermediate steps are
//! sampled-only; the last one writes through to the linear buffer.

use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::types::{EdgeMode, FilterMode, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ZoomKernel {
    Bilinear,
    Lanczos,
    Splines,
    PreciseBox,
}

impl KernelSet for ZoomKernel {
    const PROGRAM: Program = Program::Zoomer;

    fn all() -> &'static [Self] {
        &[
            ZoomKernel::Bilinear,
            ZoomKernel::Lanczos,
            ZoomKernel::Splines,
            ZoomKernel::PreciseBox,
        ]
    }

    fn entry_point(self) -> &'static str {
        match self {
            ZoomKernel::Bilinear => "bilinear",
            ZoomKernel::Lanczos => "lanczos",
            ZoomKernel::Splines => "splines",
            ZoomKernel::PreciseBox => "precise_box",
        }
    }
}

/// Lobe counts the Lanczos kernel accepts.
pub const LANCZOS_LOBES: RangeInclusive<u8> = 3..=5;

/// Resampling kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// Hardware bilinear sampling.
    Bilinear,
    /// Windowed sinc with 3, 4 or 5 lobes.
    Lanczos(u8),
    /// BC-spline with B = C = 1/3.
    Mitchell,
    /// BC-spline with B = 0, C = 1/2.
    CatmullRom,
    /// BC-spline with B = 0, C = 3/4.
    Adobe,
    /// Uniform cubic B-spline, B = 1, C = 0.
    BSpline,
}

impl Interpolation {
    /// Every accepted variant, in listing order.
    pub const ALL: [Interpolation; 8] = [
        Interpolation::Bilinear,
        Interpolation::Lanczos(3),
        Interpolation::Lanczos(4),
        Interpolation::Lanczos(5),
        Interpolation::Mitchell,
        Interpolation::CatmullRom,
        Interpolation::Adobe,
        Interpolation::BSpline,
    ];

    const SPLINES: [Interpolation; 4] = [
        Interpolation::Mitchell,
        Interpolation::CatmullRom,
        Interpolation::Adobe,
        Interpolation::BSpline,
    ];

    /// Name accepted by `FromStr`.
    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Bilinear => "bilinear",
            Interpolation::Lanczos(3) => "lan3",
            Interpolation::Lanczos(4) => "lan4",
            Interpolation::Lanczos(_) => "lan5",
            Interpolation::Mitchell => "mitchell",
            Interpolation::CatmullRom => "catmull",
            Interpolation::Adobe => "adobe",
            Interpolation::BSpline => "b-spline",
        }
    }

    /// (B, C) parameters of the spline variants.
    pub fn bc(&self) -> Option<(f32, f32)> {
        match self {
            Interpolation::Mitchell => Some((1.0 / 3.0, 1.0 / 3.0)),
            Interpolation::CatmullRom => Some((0.0, 0.5)),
            Interpolation::Adobe => Some((0.0, 0.75)),
            Interpolation::BSpline => Some((1.0, 0.0)),
            Interpolation::Bilinear | Interpolation::Lanczos(_) => None,
        }
    }

    /// Reject Lanczos lobe counts outside [`LANCZOS_LOBES`].
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match *self {
            Interpolation::Lanczos(n) if !LANCZOS_LOBES.contains(&n) => {
                Err(ValidationError::OutOfRange {
                    name: "lanczos lobes",
                    value: n as f64,
                    min: *LANCZOS_LOBES.start() as f64,
                    max: *LANCZOS_LOBES.end() as f64,
                })
            }
            _ => Ok(()),
        }
    }

    fn kernel(&self) -> ZoomKernel {
        match self {
            Interpolation::Bilinear => ZoomKernel::Bilinear,
            Interpolation::Lanczos(_) => ZoomKernel::Lanczos,
            _ => ZoomKernel::Splines,
        }
    }

    fn sampler(&self) -> (EdgeMode, FilterMode) {
        match self {
            Interpolation::Bilinear => (EdgeMode::ClampToEdge, FilterMode::Linear),
            _ => (EdgeMode::ClampToEdge, FilterMode::Nearest),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interpolation {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Interpolation::ALL
            .iter()
            .copied()
            .find(|i| i.name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Interpolation::ALL.iter().map(|i| i.name()).collect();
                ValidationError::unknown("interpolation", s, &names)
            })
    }
}

/// Cubic polynomial coefficients in ascending powers, for |x| < 1 and 1 ≤ |x| < 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplineCoeffs {
    pub upper: [f32; 4],
    pub lower: [f32; 4],
}

impl SplineCoeffs {
    /// Mitchell–Netravali polynomials for parameters (B, C), scaled by 6.
    pub fn from_bc(b: f32, c: f32) -> Self {
        Self {
            upper: [6.0 - 2.0 * b, 0.0, -18.0 + 12.0 * b + 6.0 * c, 12.0 - 9.0 * b - 6.0 * c],
            lower: [
                8.0 * b + 24.0 * c,
                -12.0 * b - 48.0 * c,
                6.0 * b + 30.0 * c,
                -b - 6.0 * c,
            ],
        }
    }

    /// Kernel weight at distance `x`.
    pub fn weight(&self, x: f32) -> f32 {
        let x = x.abs();
        let poly = |c: &[f32; 4]| (c[0] + x * (c[1] + x * (c[2] + x * c[3]))) / 6.0;
        if x < 1.0 {
            poly(&self.upper)
        } else if x < 2.0 {
            poly(&self.lower)
        } else {
            0.0
        }
    }
}

/// Sizes visited by a pyramid resample.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomPlan {
    /// Exact doublings or halvings, in order.
    pub intermediate: Vec<Size>,
    /// `src` scaled by the requested factor.
    pub target: Size,
    /// Factor left for the last dispatch, in [0.5, 2].
    pub residual: f64,
}

impl ZoomPlan {
    /// Number of dispatches the plan issues.
    pub fn dispatches(&self) -> usize {
        self.intermediate.len() + 1
    }
}

/// Split `factor` into steps of at most ×2 / ×0.5.
///
/// Fails with `TooLarge` when the target, or any doubling on the way to it,
/// exceeds `max_side` on either axis.
pub fn plan_pyramid(src: Size, factor: f64, max_side: u32) -> Result<ZoomPlan> {
    src.validate()?;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ValidationError::OutOfRange {
            name: "zoom factor",
            value: factor,
            min: 0.0,
            max: f64::MAX,
        }
        .into());
    }
    let target = src.scaled(factor);
    let too_large = || ValidationError::TooLarge {
        width: target.width,
        height: target.height,
        max: max_side,
    };
    if target.width > max_side || target.height > max_side {
        return Err(too_large().into());
    }

    let mut intermediate = Vec::new();
    let mut residual = factor;
    let mut size = src;
    while residual > 2.0 {
        size = match (size.width.checked_mul(2), size.height.checked_mul(2)) {
            (Some(w), Some(h)) if w <= max_side && h <= max_side => Size::new(w, h),
            _ => return Err(too_large().into()),
        };
        intermediate.push(size);
        residual /= 2.0;
    }
    while residual < 0.5 {
        size = Size::new((size.width / 2).max(1), (size.height / 2).max(1));
        intermediate.push(size);
        residual *= 2.0;
    }
    Ok(ZoomPlan {
        intermediate,
        target,
        residual,
    })
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Integer geometry of an exact box resample from `src` to `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreciseTaps {
    /// Units one destination pixel spans per axis.
    pub split_out: [i32; 2],
    /// Units one source pixel spans per axis.
    pub split_in: [i32; 2],
}

impl PreciseTaps {
    /// Reciprocal of the units covered by one destination pixel.
    pub fn area(&self) -> f32 {
        1.0 / (self.split_out[0] as f32 * self.split_out[1] as f32)
    }
}

/// Reduce `src → dst` per axis by its gcd into whole-unit spans.
pub fn precise_taps(src: Size, dst: Size) -> PreciseTaps {
    let axis = |s: u32, d: u32| {
        let g = gcd(s, d).max(1);
        ((s / g) as i32, (d / g) as i32)
    };
    let (out_x, in_x) = axis(src.width, dst.width);
    let (out_y, in_y) = axis(src.height, dst.height);
    PreciseTaps {
        split_out: [out_x, out_y],
        split_in: [in_x, in_y],
    }
}

/// (source index, overlap in units) for destination index `p` along one axis.
pub fn box_overlaps(p: i32, split_out: i32, split_in: i32) -> Vec<(i32, i32)> {
    let lo = p * split_out;
    let hi = lo + split_out;
    (lo / split_in..=(hi - 1) / split_in)
        .map(|s| {
            let overlap = ((s + 1) * split_in).min(hi) - (s * split_in).max(lo);
            (s, overlap)
        })
        .collect()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ZoomUniform {
    scale: [f32; 2],
    lobes: i32,
    area: f32,
    split_out: [i32; 2],
    split_in: [i32; 2],
    upper: [f32; 4],
    lower: [f32; 4],
}

/// The resampling engine.
#[derive(Debug)]
pub struct Zoomer {
    exec: Executor<ZoomKernel>,
    splines: [(Interpolation, SplineCoeffs); 4],
}

impl Zoomer {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        let splines = Interpolation::SPLINES.map(|interp| {
            let (b, c) = interp.bc().unwrap_or_default();
            (interp, SplineCoeffs::from_bc(b, c))
        });
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
            splines,
        })
    }

    /// Cached polynomials of a spline variant.
    pub fn spline(&self, interp: Interpolation) -> Option<&SplineCoeffs> {
        self.splines
            .iter()
            .find(|(i, _)| *i == interp)
            .map(|(_, coeffs)| coeffs)
    }

    fn uniform(&self, interp: Interpolation, from: Size, to: Size) -> ZoomUniform {
        let coeffs = self.spline(interp).copied().unwrap_or(SplineCoeffs {
            upper: [0.0; 4],
            lower: [0.0; 4],
        });
        ZoomUniform {
            scale: [
                to.width as f32 / from.width as f32,
                to.height as f32 / from.height as f32,
            ],
            lobes: match interp {
                Interpolation::Lanczos(n) => n as i32,
                _ => 0,
            },
            area: 0.0,
            split_out: [0; 2],
            split_in: [0; 2],
            upper: coeffs.upper,
            lower: coeffs.lower,
        }
    }

    /// Resample `src` by `factor` (1.0 keeps the size).
    pub fn run(&self, interp: Interpolation, factor: f64, src: &ImObject) -> Result<ImPtr> {
        interp.validate()?;
        let max_side = self.exec.env().info().max_texture_dimension;
        let plan = plan_pyramid(src.size(), factor, max_side)?;
        log::debug!(
            "Zoom {} by {} with {} ({} dispatches)",
            src.size(),
            factor,
            interp,
            plan.dispatches()
        );
        let kernel = interp.kernel();
        let sampler = interp.sampler();

        let mut held: Option<ImObject> = None;
        let mut token = None;
        for &size in &plan.intermediate {
            let next = {
                let input = held.as_ref().unwrap_or(src);
                let dst = self.exec.output(input, size, WriteMode::NoBuffer)?;
                let args = self
                    .exec
                    .bind_common(input, &dst, sampler)?
                    .uniform(&self.uniform(interp, input.size(), size))?;
                token = Some(self.exec.run_async(kernel, &args, size, token.as_ref())?);
                dst
            };
            held = Some(next);
        }

        let input = held.as_ref().unwrap_or(src);
        let dst = self.exec.output(input, plan.target, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(input, &dst, sampler)?
            .uniform(&self.uniform(interp, input.size(), plan.target))?;
        self.exec
            .run_blocking(kernel, &args, plan.target, token.as_ref())?;
        Ok(Arc::new(dst))
    }

    /// Exact box resample of `src` to `target`.
    pub fn precise(&self, src: &ImObject, target: Size) -> Result<ImPtr> {
        target.validate()?;
        let taps = precise_taps(src.size(), target);
        let params = ZoomUniform {
            scale: [
                target.width as f32 / src.size().width as f32,
                target.height as f32 / src.size().height as f32,
            ],
            lobes: 0,
            area: taps.area(),
            split_out: taps.split_out,
            split_in: taps.split_in,
            upper: [0.0; 4],
            lower: [0.0; 4],
        };
        log::debug!("Precise zoom {} -> {} ({:?})", src.size(), target, taps);
        let dst = self.exec.output(src, target, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(src, &dst, (EdgeMode::None, FilterMode::Nearest))?
            .uniform(&params)?;
        self.exec
            .run_blocking(ZoomKernel::PreciseBox, &args, target, None)?;
        Ok(Arc::new(dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use proptest::prelude::*;

    const NO_LIMIT: u32 = u32::MAX;

    #[test]
    fn test_parse_names() {
        assert_eq!("lan4".parse::<Interpolation>().unwrap(), Interpolation::Lanczos(4));
        assert_eq!("B-Spline".parse::<Interpolation>().unwrap(), Interpolation::BSpline);
        let err = "cubic".parse::<Interpolation>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownName { ref valid, .. } if valid.len() == 8));
        for interp in Interpolation::ALL {
            assert_eq!(interp.name().parse::<Interpolation>().unwrap(), interp);
        }
    }

    #[test]
    fn test_spline_partition_of_unity() {
        for interp in Interpolation::SPLINES {
            let (b, c) = interp.bc().unwrap();
            let coeffs = SplineCoeffs::from_bc(b, c);
            for t in [0.0f32, 0.25, 0.5, 0.9] {
                let sum: f32 = (-2..=2).map(|k| coeffs.weight(t - k as f32)).sum();
                assert!((sum - 1.0).abs() < 1e-4, "{} at {}: {}", interp, t, sum);
            }
        }
    }

    #[test]
    fn test_catmull_interpolates() {
        let coeffs = SplineCoeffs::from_bc(0.0, 0.5);
        assert!((coeffs.weight(0.0) - 1.0).abs() < 1e-6);
        assert!(coeffs.weight(1.0).abs() < 1e-6);
        assert_eq!(coeffs.weight(2.5), 0.0);
    }

    #[test]
    fn test_plan_within_range_is_single_step() {
        let plan = plan_pyramid(Size::new(100, 50), 1.5, NO_LIMIT).unwrap();
        assert!(plan.intermediate.is_empty());
        assert_eq!(plan.target, Size::new(150, 75));
        assert_eq!(plan.dispatches(), 1);
    }

    #[test]
    fn test_plan_upscale_by_eight() {
        let plan = plan_pyramid(Size::new(10, 20), 8.0, NO_LIMIT).unwrap();
        assert_eq!(plan.intermediate, vec![Size::new(20, 40), Size::new(40, 80)]);
        assert_eq!(plan.target, Size::new(80, 160));
        assert_eq!(plan.residual, 2.0);
    }

    #[test]
    fn test_plan_rejects_bad_factor() {
        assert!(plan_pyramid(Size::new(4, 4), 0.0, NO_LIMIT).is_err());
        assert!(plan_pyramid(Size::new(4, 4), f64::NAN, NO_LIMIT).is_err());
        assert!(plan_pyramid(Size::new(0, 4), 1.0, NO_LIMIT).is_err());
    }

    #[test]
    fn test_plan_rejects_oversized_target() {
        let err = plan_pyramid(Size::new(3000, 10), 2f64.powi(22), 16384).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooLarge { max: 16384, .. })
        ));
        assert!(plan_pyramid(Size::new(3000, 10), 2f64.powi(22), NO_LIMIT).is_err());
        assert!(plan_pyramid(Size::new(1000, 10), 4.0, 4000).is_ok());
        assert!(plan_pyramid(Size::new(1000, 10), 4.1, 4000).is_err());
    }

    #[test]
    fn test_lanczos_lobes_checked() {
        for interp in Interpolation::ALL {
            assert!(interp.validate().is_ok(), "{}", interp);
        }
        for lobes in [0, 1, 2, 6, 255] {
            assert!(matches!(
                Interpolation::Lanczos(lobes).validate(),
                Err(ValidationError::OutOfRange { name: "lanczos lobes", .. })
            ));
        }
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(7, 5), 1);
        assert_eq!(gcd(9, 0), 9);
    }

    #[test]
    fn test_precise_taps_reduce() {
        let taps = precise_taps(Size::new(6, 4), Size::new(4, 4));
        assert_eq!(taps.split_out, [3, 1]);
        assert_eq!(taps.split_in, [2, 1]);
        assert!((taps.area() - 1.0 / 3.0).abs() < 1e-7);
    }

    proptest! {
        #[test]
        fn pyramid_dispatch_count(w in 1u32..4000, h in 1u32..4000, exp in -6.0f64..6.0) {
            let factor = 2f64.powf(exp);
            prop_assume!(factor > 2.0 || factor < 0.5);
            let plan = plan_pyramid(Size::new(w, h), factor, NO_LIMIT).unwrap();
            let expected = factor.max(1.0 / factor).log2().ceil() as usize;
            prop_assert_eq!(plan.dispatches(), expected);
            prop_assert!((0.5..=2.0).contains(&plan.residual));

            let mut prev = Size::new(w, h);
            for &step in &plan.intermediate {
                if factor > 1.0 {
                    prop_assert_eq!(step, Size::new(prev.width * 2, prev.height * 2));
                } else {
                    prop_assert_eq!(step, Size::new((prev.width / 2).max(1), (prev.height / 2).max(1)));
                }
                prev = step;
            }
        }

        #[test]
        fn precise_weights_sum_to_span(src in 1u32..300, dst in 1u32..300) {
            let taps = precise_taps(Size::new(src, 1), Size::new(dst, 1));
            let (out, inp) = (taps.split_out[0], taps.split_in[0]);
            for p in 0..dst as i32 {
                let overlaps = box_overlaps(p, out, inp);
                let total: i32 = overlaps.iter().map(|&(_, o)| o).sum();
                prop_assert_eq!(total, out);
                prop_assert!(overlaps.iter().all(|&(s, o)| o > 0 && s >= 0 && s < src as i32));
            }
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_precise_round_trip_solid() {
        use crate::core::image::tests::test_context;
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let zoomer = Zoomer::new(&ctx, &registry).unwrap();
        let n = Size::new(12, 12);
        let bytes = [90u8, 160, 30].repeat(n.area() as usize);
        let src = ImObject::from_host(&ctx, &bytes, n, Gamma::Identity).unwrap();
        let up = zoomer.precise(&src, Size::new(18, 18)).unwrap();
        let back = zoomer.precise(&up, n).unwrap();
        assert_eq!(back.host_bytes(false).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_pyramid_output_size() {
        use crate::core::image::tests::{gradient, test_context};
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let zoomer = Zoomer::new(&ctx, &registry).unwrap();
        let size = Size::new(64, 48);
        let src = ImObject::from_host(&ctx, &gradient(size), size, Gamma::Srgb).unwrap();
        let out = zoomer.run(Interpolation::Lanczos(3), 0.2, &src).unwrap();
        assert_eq!(out.size(), Size::new(12, 9));
        assert!(out.has_buffer());
        assert_eq!(out.host_bytes(true).unwrap().len(), 3 * 12 * 9);
    }
}
