//! # gpuim - GPU image toolkit
//!
//! gpuim runs classic image operations as compute kernels on any adapter
//! `wgpu` can open. Images live on the device between operations; pixels
//! only cross back to the host when they are read or stored.
//!
//! ## Features
//!
//! - **Resampling**: bilinear, Lanczos and cubic-spline pyramids plus an exact box resampler
//! - **Rotation**: three-shear or inverse-mapped rotation with an inscribed crop
//! - **Colour spaces**: YCbCr (601/709/2020), HSV, HSL, CIE XYZ and CIE Lab
//! - **Contrast**: manual curve, exclusive histogram stretch and adaptive per-region stretch
//! - **Denoise and blur**: Haar wavelet soft thresholding and Gaussian blur
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gpuim::prelude::*;
//!
//! let toolkit = Toolkit::new(&ToolkitConfig::default())?;
//! let image = toolkit.load("input.png", Gamma::Srgb)?;
//!
//! let half = toolkit.zoomer().run(Interpolation::Lanczos(3), 0.5, &image)?;
//! let turned = toolkit.rotator().run(RotationAlgo::Shear, 12.5, &half)?;
//! let sharp = toolkit.contrast_via(
//!     ColorSpace::Ycc709,
//!     ToneCurve::Exclusive { fraction: 0.004 },
//!     &turned,
//! )?;
//!
//! toolkit.store(&sharp, "output.png")?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: device environment, kernel registry, dispatch executor, images and errors
//! - [`engines`]: one engine per kernel program
//! - [`config`]: TOML configuration
//! - [`toolkit`]: the application object tying them together

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod engines;
pub mod toolkit;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gpuim::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{
        ChannelLayout, ColorSpace, EdgeMode, FilterMode, Gamma, Rect, Size, WriteMode,
    };
    pub use crate::core::image::{ImObject, ImPtr, ImageContext};
    pub use crate::core::stats::{ImageStats, AGGREGATE};

    // Device
    pub use crate::core::device::{DeviceEnv, DeviceInfo};
    pub use crate::core::registry::{KernelRegistry, Program};

    // Errors
    pub use crate::core::error::{
        CompileError, ConfigError, DeviceError, Error, ValidationError,
    };

    // Engines
    pub use crate::engines::{
        Basis, ChannelMode, Contraster, Converser, Filter, Interpolation, RotationAlgo, Rotator,
        ToneCurve, Wavelet, Zoomer,
    };

    pub use crate::config::ToolkitConfig;
    pub use crate::toolkit::Toolkit;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
