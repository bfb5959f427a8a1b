//! Flight instrument and autopilot core for a light-aircraft EFIS.
//!
//! Sensor drivers plug in through the traits in [`hardware`]; [`efis::Efis`]
//! schedules the instrument filters, the attitude solver and the autopilot on
//! one main loop. [`sim`] stands a simulated aircraft behind every driver
//! contract.

pub mod ahrs;
pub mod autopilot;
pub mod differentiate;
pub mod efis;
pub mod error;
pub mod hardware;
pub mod instruments;
pub mod live_status;
pub mod sim;
pub mod units;

pub use efis::{AutopilotCommand, Efis, EfisConfig, EfisEvent};
pub use error::{EfisError, Result, SyntaxError};
