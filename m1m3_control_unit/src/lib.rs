//! # M1M3 Control Unit Library
//!
//! Outer-loop control core of the M1M3 mirror support system. Every control
//! cycle the force controller composes the enabled force components into one
//! per-actuator setpoint, clips and checks it, and hands it to the ILC
//! transport; the safety controller then decides whether the lifecycle state
//! machine may keep its proposed state.
//!
//! ## Threads
//!
//! 1. **Subscriber**: decodes bus messages into [`command::Command`]s
//! 2. **Worker**: executes commands and cycles one at a time
//! 3. **Outer-loop clock**: requests one cycle per tick via [`cycle::CycleBarrier`]
//!
//! ## Dependency Injection
//!
//! No globals. The [`state::Context`] owns a [`model::Model`] built from an
//! explicit publisher, transport and time source, so tests run the whole
//! pipeline against the simulated transport and a recording publisher.

#![deny(clippy::disallowed_types)]

pub mod automatic;
pub mod command;
pub mod config;
pub mod cycle;
pub mod force;
pub mod hardpoint;
pub mod model;
pub mod publisher;
pub mod safety;
pub mod state;
pub mod transport;
