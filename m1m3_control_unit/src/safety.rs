//! Safety supervision.
//!
//! The [`SafetyController`] collects fault conditions from every subsystem,
//! latches the first enabled one and overrides the next state with
//! `LoweringFault` when the cycle ends.

pub mod controller;
pub mod window;

pub use controller::SafetyController;
pub use window::SlidingWindow;
