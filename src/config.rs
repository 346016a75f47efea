//! Toolkit configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.
//!
//! ```toml
//! [device]
//! adapter = 0
//! backend = "vulkan"
//! scratch_bytes = 16777216
//!
//! [zoom]
//! interpolation = "lan3"
//!
//! [contrast]
//! exclusion_percent = 0.5
//! ```

use crate::core::error::ConfigError;
use crate::engines::rotator::RotationAlgo;
use crate::engines::wavelet::Basis;
use crate::engines::zoomer::Interpolation;
use serde::Deserialize;
use std::path::Path;

/// Environment variable overriding `device.adapter`.
pub const ADAPTER_ENV: &str = "GPUIM_ADAPTER";
/// Environment variable overriding `device.backend`.
pub const BACKEND_ENV: &str = "GPUIM_BACKEND";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolkitConfig {
    /// Adapter selection and transfer buffers.
    pub device: DeviceConfig,
    /// Resampling defaults.
    pub zoom: ZoomConfig,
    /// Rotation defaults.
    pub rotate: RotateConfig,
    /// Contrast defaults.
    pub contrast: ContrastConfig,
    /// Gaussian blur defaults.
    pub filter: FilterConfig,
    /// Wavelet denoise defaults.
    pub wavelet: WaveletConfig,
}

/// `[device]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Index into the enumerated adapters.
    pub adapter: usize,
    /// Backend family: primary, vulkan, metal, dx12, gl or all.
    pub backend: String,
    /// Size of the reusable scratch transfer buffer; 0 disables it.
    pub scratch_bytes: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            backend: "primary".to_string(),
            scratch_bytes: 16 * 1024 * 1024,
        }
    }
}

impl DeviceConfig {
    /// Resolve `backend` into wgpu backend bits.
    pub fn backends(&self) -> Result<wgpu::Backends, ConfigError> {
        let backends = match self.backend.to_ascii_lowercase().as_str() {
            "primary" => wgpu::Backends::PRIMARY,
            "vulkan" => wgpu::Backends::VULKAN,
            "metal" => wgpu::Backends::METAL,
            "dx12" => wgpu::Backends::DX12,
            "gl" => wgpu::Backends::GL,
            "all" => wgpu::Backends::all(),
            other => {
                return Err(ConfigError::Invalid {
                    key: "device.backend",
                    reason: format!(
                        "unknown backend '{}', expected primary, vulkan, metal, dx12, gl or all",
                        other
                    ),
                })
            }
        };
        Ok(backends)
    }
}

/// `[zoom]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ZoomConfig {
    /// Default interpolation name.
    pub interpolation: String,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            interpolation: "bilinear".to_string(),
        }
    }
}

/// `[rotate]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RotateConfig {
    /// Default rotation algorithm name.
    pub algorithm: String,
}

impl Default for RotateConfig {
    fn default() -> Self {
        Self {
            algorithm: "shear".to_string(),
        }
    }
}

/// `[contrast]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ContrastConfig {
    /// Share of pixels clipped at each end by the exclusive stretch, in percent.
    pub exclusion_percent: f32,
    /// Pixels clipped at each end of every adaptive region.
    pub adaptive_exclude: u32,
    /// Side of the square adaptive region.
    pub adaptive_region: u32,
}

impl Default for ContrastConfig {
    fn default() -> Self {
        Self {
            exclusion_percent: 0.39,
            adaptive_exclude: 5,
            adaptive_region: 16,
        }
    }
}

/// `[filter]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Gaussian standard deviation.
    pub sigma: f32,
    /// Odd window size.
    pub window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            window: 3,
        }
    }
}

/// `[wavelet]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WaveletConfig {
    /// Basis name.
    pub basis: String,
    /// Soft threshold applied to detail coefficients.
    pub threshold: f32,
}

impl Default for WaveletConfig {
    fn default() -> Self {
        Self {
            basis: "haar".to_string(),
            threshold: 0.01,
        }
    }
}

impl ToolkitConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ToolkitConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    /// Apply `GPUIM_ADAPTER` / `GPUIM_BACKEND` on top of the file values.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(index) = std::env::var(ADAPTER_ENV) {
            self.device.adapter = index.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "device.adapter",
                reason: format!("{}='{}' is not an adapter index", ADAPTER_ENV, index),
            })?;
        }
        if let Ok(backend) = std::env::var(BACKEND_ENV) {
            self.device.backend = backend;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check ranges and resolve every default name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.backends()?;
        self.zoom
            .interpolation
            .parse::<Interpolation>()
            .map_err(|e| invalid("zoom.interpolation", e))?;
        self.rotate
            .algorithm
            .parse::<RotationAlgo>()
            .map_err(|e| invalid("rotate.algorithm", e))?;
        self.wavelet
            .basis
            .parse::<Basis>()
            .map_err(|e| invalid("wavelet.basis", e))?;

        if !(0.0..50.0).contains(&self.contrast.exclusion_percent) {
            return Err(invalid("contrast.exclusion_percent", "expected in [0, 50)"));
        }
        if self.contrast.adaptive_region == 0 {
            return Err(invalid("contrast.adaptive_region", "must be positive"));
        }
        if 2 * u64::from(self.contrast.adaptive_exclude)
            >= u64::from(self.contrast.adaptive_region).pow(2)
        {
            return Err(invalid(
                "contrast.adaptive_exclude",
                "twice the exclusion must stay below the region area",
            ));
        }
        if !self.filter.sigma.is_finite() || self.filter.sigma <= 0.0 {
            return Err(invalid("filter.sigma", "must be positive"));
        }
        if self.filter.window % 2 == 0 {
            return Err(invalid("filter.window", "must be odd"));
        }
        if !self.wavelet.threshold.is_finite() || self.wavelet.threshold < 0.0 {
            return Err(invalid("wavelet.threshold", "must not be negative"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
