//! Error types for gpuim.
//!
//! Uses thiserror for structured errors with context. Errors fall into four groups:
//! - Device failures (allocation, dispatch, readback): fatal to the current operation
//! - Parameter validation: reported before anything is dispatched
//! - Kernel compilation: carries the full compiler diagnostic, fatal to startup
//! - Configuration loading and image file I/O

use std::fmt;
use thiserror::Error;

/// Human-readable category of an accelerator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// An argument or descriptor was rejected by the device.
    InvalidValue,
    /// The device ran out of a non-memory resource (bindings, dispatch limits).
    OutOfResources,
    /// Device or host memory exhausted.
    OutOfMemory,
    /// The device was lost or the driver reset.
    DeviceLost,
    /// The request needs a capability the adapter lacks.
    Unsupported,
    /// Anything the driver reports that does not fit above.
    Internal,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::InvalidValue => "invalid value",
            Status::OutOfResources => "out of resources",
            Status::OutOfMemory => "out of memory",
            Status::DeviceLost => "device lost",
            Status::Unsupported => "unsupported",
            Status::Internal => "internal error",
        };
        f.write_str(text)
    }
}

impl From<&wgpu::Error> for Status {
    fn from(error: &wgpu::Error) -> Self {
        match error {
            wgpu::Error::OutOfMemory { .. } => Status::OutOfMemory,
            wgpu::Error::Validation { .. } => Status::InvalidValue,
            wgpu::Error::Internal { .. } => Status::Internal,
        }
    }
}

/// Top-level error type for gpuim.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image file error: {0}")]
    Image(#[from] image::ImageError),
}

/// Allocation, dispatch and transfer failures on the accelerator.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No compatible adapter found")]
    NoAdapter,

    #[error("Illegal adapter index {index} ({available} available)")]
    IllegalAdapter { index: usize, available: usize },

    #[error("Failed to open device: {0}")]
    RequestDevice(String),

    #[error("Adapter '{adapter}' cannot be used: {status}: {missing}")]
    Capability {
        adapter: String,
        status: Status,
        missing: String,
    },

    #[error("Failed to allocate {what}: {status}: {message}")]
    Allocation {
        what: String,
        status: Status,
        message: String,
    },

    #[error("Dispatch of '{kernel}' failed: {status}: {message}")]
    Dispatch {
        kernel: String,
        status: Status,
        message: String,
    },

    #[error("Failed to bind arguments of '{kernel}': {message}")]
    Binding { kernel: String, message: String },

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Device error: {status}: {message}")]
    Uncaptured { status: Status, message: String },
}

/// Errors raised while checking request parameters, before any dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown {kind} '{name}', expected one of: {}", valid.join(", "))]
    UnknownName {
        kind: &'static str,
        name: String,
        valid: Vec<String>,
    },

    #[error("Invalid {name} {value}, expected in range [{min}..{max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Exclusion too aggressive: clipped range [{min}..{max}] is empty")]
    ExclusionTooAggressive { min: usize, max: usize },

    #[error("Exclusion of {exclude} pixels too big for a region of {area} pixels")]
    RegionTooLarge { exclude: u32, area: u32 },

    #[error("Cannot convert {from} to {to}, valid targets: {}", valid.join(", "))]
    UnsupportedConversion {
        from: String,
        to: String,
        valid: Vec<String>,
    },

    #[error("Image is in {actual}, expected {expected}")]
    SpaceMismatch { expected: String, actual: String },

    #[error("Expected {expected} bytes of RGB data, got {actual}")]
    ByteCount { expected: usize, actual: usize },

    #[error("Image dimensions must be positive")]
    EmptyImage,

    #[error("Filter window must be odd, got {0}")]
    EvenWindow(usize),

    #[error("{0} degrees is not a quarter turn")]
    NotQuarterTurn(i64),

    #[error("Image {width}x{height} exceeds the device limit of {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
}

/// Kernel program build failures.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to build program '{program}':\n{log}")]
    Program { program: &'static str, log: String },

    #[error("Program '{program}' has no kernel '{kernel}'")]
    MissingKernel {
        program: &'static str,
        kernel: &'static str,
    },
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl Error {
    /// Whether the session has to be torn down after this error.
    ///
    /// Device and compile failures leave the environment unusable; validation
    /// and config errors only reject the request at hand.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Device(_) | Error::Compile(_))
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            Error::Device(DeviceError::IllegalAdapter { available, .. }) => Some(format!(
                "Pick an adapter index below {} (run `gpuim env`)",
                available
            )),
            Error::Device(DeviceError::NoAdapter) => {
                Some("Install a Vulkan, Metal or DX12 capable driver".to_string())
            }
            Error::Validation(ValidationError::ExclusionTooAggressive { .. }) => {
                Some("Lower the exclusion percentage".to_string())
            }
            Error::Validation(ValidationError::RegionTooLarge { area, .. }) => Some(format!(
                "Exclude fewer than {} pixels or enlarge the region",
                area.div_ceil(2)
            )),
            Error::Validation(ValidationError::UnsupportedConversion { from, to, .. }) => {
                Some(format!("Convert {} to srgb first, then srgb to {}", from, to))
            }
            Error::Validation(ValidationError::EvenWindow(size)) => {
                Some(format!("Use a window of {} or {}", (*size).max(2) - 1, size + 1))
            }
            _ => None,
        }
    }
}

impl ValidationError {
    /// Build an `UnknownName` error from the accepted spellings.
    pub fn unknown(kind: &'static str, name: &str, valid: &[&str]) -> Self {
        ValidationError::UnknownName {
            kind,
            name: name.to_string(),
            valid: valid.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Result type alias for gpuim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::InvalidValue.to_string(), "invalid value");
        assert_eq!(Status::OutOfResources.to_string(), "out of resources");
        assert_eq!(Status::DeviceLost.to_string(), "device lost");
        assert_eq!(Status::Unsupported.to_string(), "unsupported");
    }

    #[test]
    fn test_error_conversion() {
        let validation = ValidationError::EmptyImage;
        let error: Error = validation.into();
        assert!(matches!(error, Error::Validation(_)));
        assert!(!error.is_fatal());

        let device: Error = DeviceError::NoAdapter.into();
        assert!(device.is_fatal());
    }

    #[test]
    fn test_unknown_name_lists_choices() {
        let error = ValidationError::unknown("rotation", "skew", &["shear", "map"]);
        assert_eq!(
            error.to_string(),
            "Unknown rotation 'skew', expected one of: shear, map"
        );
    }

    #[test]
    fn test_suggested_fix() {
        let error = Error::from(ValidationError::RegionTooLarge { exclude: 8, area: 16 });
        assert_eq!(
            error.suggested_fix().as_deref(),
            Some("Exclude fewer than 8 pixels or enlarge the region")
        );
        assert!(Error::from(ValidationError::EmptyImage).suggested_fix().is_none());
    }

    #[test]
    fn test_compile_error_keeps_log() {
        let error = CompileError::Program {
            program: "zoomer",
            log: "error: unknown identifier 'tap'".to_string(),
        };
        assert!(error.to_string().contains("unknown identifier 'tap'"));
    }
}
