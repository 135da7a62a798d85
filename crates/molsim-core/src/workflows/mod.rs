//! # Workflows Module
//!
//! High-level procedures built on the engine. A workflow takes a prepared system or
//! context, drives it to completion, reports progress along the way and hands back the
//! recorded results.
//!
//! ## Architecture
//!
//! - **Simulation Workflow** ([`simulate`]) - Runs a context for a fixed number of steps,
//!   recording snapshots at a fixed interval, either on an existing context or from a
//!   loaded `SimulationConfig`.

pub mod simulate;
