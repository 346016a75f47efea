//! Plain value types shared by the environment, images and engines.

use crate::core::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width × height of an image or dispatch grid, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Both dimensions non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Fail with `EmptyImage` unless both dimensions are positive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ValidationError::EmptyImage)
        }
    }

    /// Width and height exchanged.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Scale both dimensions, truncating toward zero and keeping at least one pixel.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: u32| ((v as f64 * factor) as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }

    /// As a `[w, h]` pair for uniform blocks.
    pub fn to_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// X offset from the image origin
    pub x: u32,
    /// Y offset from the image origin
    pub y: u32,
    /// Width of the region
    pub width: u32,
    /// Height of the region
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The rectangle covering a whole image of `size`.
    pub fn full(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Get the right edge coordinate (exclusive).
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Get the bottom edge coordinate (exclusive).
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Extent of the rectangle.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Check if this region is entirely within the given bounds.
    pub fn is_within(&self, bounds: Size) -> bool {
        self.right() <= bounds.width && self.bottom() <= bounds.height
    }
}

/// Whether an operation also fills the linear transfer buffer of its result.
///
/// Terminal steps write through so the result can be read back without an
/// extra pass; intermediate pyramid and lifting steps do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Sampled representation only.
    NoBuffer,
    /// Sampled representation plus the linear buffer.
    #[default]
    WriteBuffer,
}

impl WriteMode {
    pub(crate) fn flag(self) -> u32 {
        match self {
            WriteMode::NoBuffer => 0,
            WriteMode::WriteBuffer => 1,
        }
    }
}

/// Transfer function applied between display bytes and the sampled representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Gamma {
    /// Decode sRGB on upload, encode on download.
    #[default]
    Srgb,
    /// Bytes are mapped linearly onto [0, 1].
    Identity,
}

impl Gamma {
    /// `Srgb` when `linearize` is set, `Identity` otherwise.
    pub fn from_flag(linearize: bool) -> Self {
        if linearize {
            Gamma::Srgb
        } else {
            Gamma::Identity
        }
    }
}

/// Sampler addressing outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeMode {
    /// Reads outside return the transparent border colour.
    Clamp,
    /// Reads outside repeat the nearest edge texel.
    ClampToEdge,
    /// Coordinates are assumed in range.
    None,
}

/// Sampler interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Bilinear blend of the four nearest texels.
    Linear,
}

/// Channel layout of a device image allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Four float channels in the environment's texel format.
    Rgba,
    /// One 32-bit float channel (coefficient tables).
    Single,
}

/// Colour space an image's sampled representation is expressed in.
///
/// Every space stores its three components normalised to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// Linear-light RGB as loaded.
    #[default]
    Srgb,
    /// YCbCr with BT.601 luma weights.
    Ycc601,
    /// YCbCr with BT.709 luma weights.
    Ycc709,
    /// YCbCr with BT.2020 luma weights.
    Ycc2020,
    /// Hue, saturation, value.
    Hsv,
    /// Hue, saturation, lightness.
    Hsl,
    /// CIE 1931 XYZ.
    CieXyz,
    /// CIE L*a*b*.
    CieLab,
}

impl ColorSpace {
    /// Every space, in the order names are listed to users.
    pub const ALL: [ColorSpace; 8] = [
        ColorSpace::Srgb,
        ColorSpace::Ycc601,
        ColorSpace::Ycc709,
        ColorSpace::Ycc2020,
        ColorSpace::Hsv,
        ColorSpace::Hsl,
        ColorSpace::CieXyz,
        ColorSpace::CieLab,
    ];

    /// Name accepted by `FromStr`.
    pub fn name(&self) -> &'static str {
        match self {
            ColorSpace::Srgb => "srgb",
            ColorSpace::Ycc601 => "ycc601",
            ColorSpace::Ycc709 => "ycc709",
            ColorSpace::Ycc2020 => "ycc2020",
            ColorSpace::Hsv => "hsv",
            ColorSpace::Hsl => "hsl",
            ColorSpace::CieXyz => "ciexyz",
            ColorSpace::CieLab => "cielab",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorSpace {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ColorSpace::ALL
            .iter()
            .copied()
            .find(|space| space.name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = ColorSpace::ALL.iter().map(|s| s.name()).collect();
                ValidationError::unknown("colour space", s, &names)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_scaled_truncates() {
        let size = Size::new(101, 33);
        assert_eq!(size.scaled(0.5), Size::new(50, 16));
        assert_eq!(size.scaled(0.001), Size::new(1, 1));
        assert_eq!(size.scaled(2.0), Size::new(202, 66));
    }

    #[test]
    fn test_size_validate() {
        assert!(Size::new(1, 1).validate().is_ok());
        assert_eq!(Size::new(0, 4).validate(), Err(ValidationError::EmptyImage));
    }

    #[test]
    fn test_rect_bounds() {
        let rect = Rect::new(2, 3, 10, 5);
        assert_eq!(rect.right(), 12);
        assert_eq!(rect.bottom(), 8);
        assert!(rect.is_within(Size::new(12, 8)));
        assert!(!rect.is_within(Size::new(11, 8)));
    }

    #[test]
    fn test_color_space_parse() {
        assert_eq!("HSV".parse::<ColorSpace>().unwrap(), ColorSpace::Hsv);
        assert_eq!("ycc2020".parse::<ColorSpace>().unwrap(), ColorSpace::Ycc2020);
        let err = "rgb".parse::<ColorSpace>().unwrap_err();
        assert!(err.to_string().contains("srgb, ycc601"));
    }
}
