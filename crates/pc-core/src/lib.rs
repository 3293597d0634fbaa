//! pc-core: shared foundation for the process control workspace.
//!
//! Contains:
//! - numeric (finite checks, bounds, saturation)
//! - timing (tick timers used by the control loop)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use numeric::*;
