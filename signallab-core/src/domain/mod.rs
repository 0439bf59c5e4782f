//! Domain types for SignalLab

pub mod bar;
pub mod ids;
pub mod signal;

pub use bar::DailyBar;
pub use ids::{ConfigHash, SecurityId};
pub use signal::{Signal, SignalDirection};
