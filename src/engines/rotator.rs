//! Rotation.
//!
//! Quarter turns go through dedicated transposing kernels. Any other angle
//! is rotated into a bounding canvas and then cropped to the largest
//! axis-aligned rectangle that lies entirely inside the rotated source, so
//! no unfilled border ever reaches the caller.

use crate::core::error::{Result, ValidationError};
use crate::core::executor::Executor;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, Program};
use crate::core::types::{EdgeMode, FilterMode, Rect, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RotKernel {
    Copy,
    Clockwise,
    CounterClockwise,
    Flip,
    ShearRotate,
    MapRotate,
    Crop,
}

impl KernelSet for RotKernel {
    const PROGRAM: Program = Program::Rotator;

    fn all() -> &'static [Self] {
        &[
            RotKernel::Copy,
            RotKernel::Clockwise,
            RotKernel::CounterClockwise,
            RotKernel::Flip,
            RotKernel::ShearRotate,
            RotKernel::MapRotate,
            RotKernel::Crop,
        ]
    }

    fn entry_point(self) -> &'static str {
        match self {
            RotKernel::Copy => "copy",
            RotKernel::Clockwise => "clockwise",
            RotKernel::CounterClockwise => "counter_clockwise",
            RotKernel::Flip => "flip",
            RotKernel::ShearRotate => "shear_rotate",
            RotKernel::MapRotate => "map_rotate",
            RotKernel::Crop => "crop",
        }
    }
}

/// Strategy for angles that are not quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationAlgo {
    /// Three-shear decomposition scattered from source pixels, nearest sampling.
    #[default]
    Shear,
    /// Inverse mapping over the canvas with linear sampling.
    Map,
}

impl RotationAlgo {
    pub const ALL: [RotationAlgo; 2] = [RotationAlgo::Shear, RotationAlgo::Map];

    pub fn name(&self) -> &'static str {
        match self {
            RotationAlgo::Shear => "shear",
            RotationAlgo::Map => "map",
        }
    }

    // Shear rounding displaces a pixel by up to one and a half.
    fn margin(&self) -> u32 {
        match self {
            RotationAlgo::Shear => 2,
            RotationAlgo::Map => 0,
        }
    }
}

impl fmt::Display for RotationAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RotationAlgo {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        RotationAlgo::ALL
            .iter()
            .copied()
            .find(|a| a.name() == lower)
            .ok_or_else(|| ValidationError::unknown("rotation algorithm", s, &["shear", "map"]))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RotUniform {
    src_center: [i32; 2],
    dst_center: [i32; 2],
    a: f32,
    b: f32,
    half_turn: i32,
    _pad: i32,
}

/// Integer pivot of an image: the upper-left of the two middle pixels.
pub fn center(size: Size) -> (i32, i32) {
    ((size.width as i32 + 1) / 2 - 1, (size.height as i32 + 1) / 2 - 1)
}

/// Split `theta` into a residual within ±90° and whether a half turn precedes it.
pub fn shear_angle(theta: f64) -> (f64, bool) {
    use std::f64::consts::{FRAC_PI_2, PI, TAU};
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped > FRAC_PI_2 {
        (wrapped - PI, true)
    } else if wrapped < -FRAC_PI_2 {
        (wrapped + PI, true)
    } else {
        (wrapped, false)
    }
}

/// Canvas holding `src` rotated by `theta` radians.
pub fn bounding_size(src: Size, theta: f64) -> Size {
    let (sin, cos) = theta.sin_cos();
    let (w, h) = (src.width as f64, src.height as f64);
    Size::new(
        (w * cos.abs() + h * sin.abs()) as u32 + 1,
        (h * cos.abs() + w * sin.abs()) as u32 + 1,
    )
}

/// Largest rectangle of the canvas whose corners map back inside `src`.
///
/// Starts from the closed-form maximal rectangle inscribed in the rotated
/// source, centred on the canvas pivot, and shrinks it until every integer
/// corner maps at least `margin` pixels inside the source. Fails with
/// `EmptyImage` when not even the pivot pixel does.
pub fn inscribed_rect(
    src: Size,
    canvas: Size,
    theta: f64,
    margin: u32,
) -> std::result::Result<Rect, ValidationError> {
    let (w, h) = (src.width as f64, src.height as f64);
    let (sin, cos) = theta.sin_cos();
    let (sin_a, cos_a) = (sin.abs(), cos.abs());

    let width_is_longer = w >= h;
    let (long, short) = if width_is_longer { (w, h) } else { (h, w) };
    let (rw, rh) = if short <= 2.0 * sin_a * cos_a * long || (sin_a - cos_a).abs() < 1e-10 {
        let x = 0.5 * short;
        if width_is_longer {
            (x / sin_a, x / cos_a)
        } else {
            (x / cos_a, x / sin_a)
        }
    } else {
        let cos_2a = cos_a * cos_a - sin_a * sin_a;
        ((w * cos_a - h * sin_a) / cos_2a, (h * cos_a - w * sin_a) / cos_2a)
    };

    let (dcx, dcy) = center(canvas);
    let place = |width: u32, height: u32| {
        let x = (dcx - (width as i32 - 1) / 2).max(0) as u32;
        let y = (dcy - (height as i32 - 1) / 2).max(0) as u32;
        Rect::new(x, y, width.min(canvas.width - x), height.min(canvas.height - y))
    };

    let clamp = |v: f64, max: u32| (v.floor().max(1.0) as u32).min(max);
    let mut width = clamp(rw, canvas.width);
    let mut height = clamp(rh, canvas.height);
    loop {
        let rect = place(width, height);
        if corners_inside(src, canvas, theta, margin, rect) {
            return Ok(rect);
        }
        if width == 1 && height == 1 {
            return Err(ValidationError::EmptyImage);
        }
        width = width.saturating_sub(1).max(1);
        height = height.saturating_sub(1).max(1);
    }
}

/// Whether every corner of `rect` maps back at least `margin` pixels inside `src`.
pub fn corners_inside(src: Size, canvas: Size, theta: f64, margin: u32, rect: Rect) -> bool {
    let (sin, cos) = theta.sin_cos();
    let (scx, scy) = center(src);
    let (dcx, dcy) = center(canvas);
    let lo = margin as f64 - 1e-6;
    let hi_x = src.width as f64 - 1.0 - margin as f64 + 1e-6;
    let hi_y = src.height as f64 - 1.0 - margin as f64 + 1e-6;
    let inside = |x: i32, y: i32| {
        let (dx, dy) = ((x - dcx) as f64, (y - dcy) as f64);
        let sx = dx * cos + dy * sin + scx as f64;
        let sy = -dx * sin + dy * cos + scy as f64;
        (lo..=hi_x).contains(&sx) && (lo..=hi_y).contains(&sy)
    };
    let (x0, y0) = (rect.x as i32, rect.y as i32);
    let (x1, y1) = (x0 + rect.width as i32 - 1, y0 + rect.height as i32 - 1);
    inside(x0, y0) && inside(x1, y0) && inside(x0, y1) && inside(x1, y1)
}

/// The rotation engine.
#[derive(Debug)]
pub struct Rotator {
    exec: Executor<RotKernel>,
}

impl Rotator {
    pub fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        Ok(Self {
            exec: Executor::new(ctx, registry)?,
        })
    }

    /// Rotate `src` clockwise by `degrees`.
    pub fn run(&self, algo: RotationAlgo, degrees: f64, src: &ImObject) -> Result<ImPtr> {
        if !degrees.is_finite() {
            return Err(ValidationError::OutOfRange {
                name: "angle",
                value: degrees,
                min: f64::MIN,
                max: f64::MAX,
            }
            .into());
        }
        if degrees.fract() == 0.0 && (degrees as i64) % 90 == 0 {
            return self.quarter_turn(src, degrees as i64);
        }

        let theta = degrees.to_radians();
        let size = src.size();
        let canvas = bounding_size(size, theta);
        let (scx, scy) = center(size);
        let (dcx, dcy) = center(canvas);
        let rect = inscribed_rect(size, canvas, theta, algo.margin())?;
        let (kernel, sampler, grid, a, b, half_turn) = match algo {
            RotationAlgo::Shear => {
                let (residual, half_turn) = shear_angle(theta);
                (
                    RotKernel::ShearRotate,
                    (EdgeMode::None, FilterMode::Nearest),
                    size,
                    -(residual / 2.0).tan(),
                    residual.sin(),
                    half_turn,
                )
            }
            RotationAlgo::Map => (
                RotKernel::MapRotate,
                (EdgeMode::Clamp, FilterMode::Linear),
                canvas,
                theta.sin(),
                theta.cos(),
                false,
            ),
        };
        let params = RotUniform {
            src_center: [scx, scy],
            dst_center: [dcx, dcy],
            a: a as f32,
            b: b as f32,
            half_turn: i32::from(half_turn),
            _pad: 0,
        };
        log::debug!("Rotate {} by {} ({}) into {}", size, degrees, algo, canvas);

        let rotated = self.exec.output(src, canvas, WriteMode::NoBuffer)?;
        let args = self.exec.bind_common(src, &rotated, sampler)?.uniform(&params)?;
        let token = self.exec.run_async(kernel, &args, grid, None)?;

        let crop = RotUniform {
            src_center: [rect.x as i32, rect.y as i32],
            ..params
        };
        let dst = self.exec.output(src, rect.size(), WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(&rotated, &dst, (EdgeMode::None, FilterMode::Nearest))?
            .uniform(&crop)?;
        self.exec
            .run_blocking(RotKernel::Crop, &args, rect.size(), Some(&token))?;
        Ok(Arc::new(dst))
    }

    /// Rotate by a multiple of 90 degrees without interpolation.
    pub fn quarter_turn(&self, src: &ImObject, degrees: i64) -> Result<ImPtr> {
        if degrees % 90 != 0 {
            return Err(ValidationError::NotQuarterTurn(degrees).into());
        }
        let (kernel, size) = match degrees.rem_euclid(360) {
            0 => (RotKernel::Copy, src.size()),
            90 => (RotKernel::Clockwise, src.size().transposed()),
            180 => (RotKernel::Flip, src.size()),
            _ => (RotKernel::CounterClockwise, src.size().transposed()),
        };
        let dst = self.exec.output(src, size, WriteMode::WriteBuffer)?;
        let args = self
            .exec
            .bind_common(src, &dst, (EdgeMode::None, FilterMode::Nearest))?;
        self.exec.run_blocking(kernel, &args, size, None)?;
        Ok(Arc::new(dst))
    }

    pub fn clockwise(&self, src: &ImObject) -> Result<ImPtr> {
        self.quarter_turn(src, 90)
    }

    pub fn counter_clockwise(&self, src: &ImObject) -> Result<ImPtr> {
        self.quarter_turn(src, -90)
    }

    pub fn flip(&self, src: &ImObject) -> Result<ImPtr> {
        self.quarter_turn(src, 180)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_algo() {
        assert_eq!("Map".parse::<RotationAlgo>().unwrap(), RotationAlgo::Map);
        assert!(matches!(
            "bicubic".parse::<RotationAlgo>(),
            Err(ValidationError::UnknownName { kind: "rotation algorithm", .. })
        ));
    }

    #[test]
    fn test_center() {
        assert_eq!(center(Size::new(4, 5)), (1, 2));
        assert_eq!(center(Size::new(1, 1)), (0, 0));
    }

    #[test]
    fn test_bounding_size() {
        assert_eq!(bounding_size(Size::new(40, 20), 0.0), Size::new(41, 21));
        let quarter = bounding_size(Size::new(40, 20), std::f64::consts::FRAC_PI_2);
        assert_eq!(quarter, Size::new(21, 41));
        let diag = bounding_size(Size::new(10, 10), std::f64::consts::FRAC_PI_4);
        assert_eq!(diag, Size::new(15, 15));
    }

    #[test]
    fn test_zero_angle_rect_is_source() {
        for size in [Size::new(4, 4), Size::new(5, 3), Size::new(64, 17)] {
            let canvas = bounding_size(size, 0.0);
            let rect = inscribed_rect(size, canvas, 0.0, 0).unwrap();
            assert_eq!(rect.size(), size);
            assert!(rect.is_within(canvas));
        }
    }

    #[test]
    fn test_square_at_45_degrees() {
        let size = Size::new(100, 100);
        let theta = std::f64::consts::FRAC_PI_4;
        let canvas = bounding_size(size, theta);
        let rect = inscribed_rect(size, canvas, theta, 0).unwrap();
        // Inscribed square of a rotated square has side s / sqrt(2).
        assert!((rect.width as i32 - 70).abs() <= 2, "{:?}", rect);
        assert_eq!(rect.width, rect.height);
    }

    #[test]
    fn test_tiny_source_has_no_shear_crop() {
        let size = Size::new(3, 3);
        let theta = 30f64.to_radians();
        let canvas = bounding_size(size, theta);
        assert_eq!(
            inscribed_rect(size, canvas, theta, RotationAlgo::Shear.margin()),
            Err(ValidationError::EmptyImage)
        );
        let rect = inscribed_rect(size, canvas, theta, RotationAlgo::Map.margin()).unwrap();
        assert!(corners_inside(size, canvas, theta, 0, rect));
    }

    proptest! {
        #[test]
        fn inscribed_corners_map_inside(
            w in 8u32..400,
            h in 8u32..400,
            degrees in -179.0f64..179.0,
            margin in 0u32..3,
        ) {
            let size = Size::new(w, h);
            let theta = degrees.to_radians();
            let canvas = bounding_size(size, theta);
            let rect = inscribed_rect(size, canvas, theta, margin).unwrap();
            prop_assert!(rect.is_within(canvas));
            prop_assert!(corners_inside(size, canvas, theta, margin, rect));
        }

        #[test]
        fn shear_residual_within_quarter(degrees in -720.0f64..720.0) {
            let theta = degrees.to_radians();
            let (residual, half_turn) = shear_angle(theta);
            prop_assert!(residual.abs() <= std::f64::consts::FRAC_PI_2 + 1e-12);
            let total = residual + if half_turn { std::f64::consts::PI } else { 0.0 };
            prop_assert!((total.sin() - theta.sin()).abs() < 1e-9);
            prop_assert!((total.cos() - theta.cos()).abs() < 1e-9);
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_zero_degrees_is_identity() {
        use crate::core::image::tests::{gradient, test_context};
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let rotator = Rotator::new(&ctx, &registry).unwrap();
        let size = Size::new(33, 21);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = rotator.run(RotationAlgo::Shear, 0.0, &src).unwrap();
        assert_eq!(out.size(), size);
        assert_eq!(out.host_bytes(false).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_clockwise_moves_bottom_left_to_top_left() {
        use crate::core::image::tests::{gradient, test_context};
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let rotator = Rotator::new(&ctx, &registry).unwrap();
        let size = Size::new(6, 4);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let out = rotator.clockwise(&src).unwrap();
        assert_eq!(out.size(), Size::new(4, 6));
        let bottom_left = 3 * (3 * 6) as usize;
        assert_eq!(&out.host_bytes(false).unwrap()[..3], &bytes[bottom_left..bottom_left + 3]);

        let back = rotator.counter_clockwise(&out).unwrap();
        assert_eq!(back.host_bytes(false).unwrap(), &bytes[..]);
        assert!(rotator.quarter_turn(&src, 45).is_err());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_arbitrary_angle_crops_to_inscribed_rect() {
        use crate::core::image::tests::test_context;
        use crate::core::types::Gamma;
        let Some((ctx, registry)) = test_context() else { return };
        let rotator = Rotator::new(&ctx, &registry).unwrap();
        let size = Size::new(80, 60);
        let src = ImObject::from_host(&ctx, &vec![200u8; 3 * 80 * 60], size, Gamma::Identity).unwrap();
        for algo in RotationAlgo::ALL {
            let out = rotator.run(algo, 30.0, &src).unwrap();
            let theta = 30f64.to_radians();
            let expected =
                inscribed_rect(size, bounding_size(size, theta), theta, algo.margin()).unwrap();
            assert_eq!(out.size(), expected.size());
            // A uniform source leaves no dark border after cropping.
            assert!(out.host_bytes(false).unwrap().iter().all(|&v| v >= 190), "{}", algo);
        }
    }
}
