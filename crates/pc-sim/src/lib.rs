//! Plant simulation for the process control loop.
//!
//! Provides:
//! - the `Plant` trait: anything that turns a commanded output into the next
//!   raw measurement
//! - a first-order lag plant with optional seeded disturbance
//! - a fault injector that overrides readings on chosen ticks

pub mod error;
pub mod faults;
pub mod first_order;
pub mod plant;

pub use error::{SimError, SimResult};
pub use faults::{FaultInjector, ScheduledFault};
pub use first_order::{DisturbanceConfig, FirstOrderParams, FirstOrderPlant};
pub use plant::Plant;
