//! The image engines, one per kernel program.
//!
//! Every engine resolves its kernels from the compiled registry when it is
//! built and holds nothing else, so engines are cheap to share by reference.

pub mod contraster;
pub mod converser;
pub mod filter;
pub mod rotator;
pub mod wavelet;
pub mod zoomer;

pub use contraster::{ChannelMode, Contraster, ToneCurve};
pub use converser::Converser;
pub use filter::Filter;
pub use rotator::{RotationAlgo, Rotator};
pub use wavelet::{Basis, Wavelet};
pub use zoomer::{Interpolation, Zoomer};
