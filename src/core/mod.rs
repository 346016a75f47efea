//! Core building blocks of the toolkit.
//!
//! - Plain value types and lookup tables
//! - The device environment and kernel registry
//! - The dispatch executor shared by every engine
//! - Device-resident images and their statistics
//! - Error types

pub mod device;
pub mod error;
pub mod executor;
pub mod image;
pub mod registry;
pub mod stats;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use device::{AdapterSummary, DeviceEnv, DeviceInfo, Token};
pub use error::{CompileError, ConfigError, DeviceError, Error, Result, Status, ValidationError};
pub use image::{ImObject, ImPtr, ImageContext};
pub use registry::{KernelRegistry, Program};
pub use stats::{ImageStats, AGGREGATE};
pub use tables::LookupTables;
pub use types::{ChannelLayout, ColorSpace, EdgeMode, FilterMode, Gamma, Rect, Size, WriteMode};
