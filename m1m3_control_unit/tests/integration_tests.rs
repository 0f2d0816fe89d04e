//! Integration tests for the M1M3 Control Unit.
//!
//! These tests drive the command controller, state machine, force
//! controller and safety controller together against the simulated cell,
//! following the workflows an operator would run.

mod integration;
