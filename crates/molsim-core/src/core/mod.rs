//! # Core Module
//!
//! This module provides the passive building blocks of a simulation: what the particles
//! are, how they are constrained, which force contributors act on them, and what a
//! point-in-time copy of their state looks like.
//!
//! ## Architecture
//!
//! - **System Description** ([`models`]) - Particle masses, distance constraints, periodic
//!   boxes, live state and snapshots
//! - **Force Contributors** ([`forcefield`]) - The `ForceContributor` contract, force
//!   groups, and the concrete bonded, nonbonded and external-field contributors
//! - **Physical Constants** ([`units`]) - Constants of the MD unit system
//!
//! ## Units
//!
//! Every quantity uses the MD unit system: nanometers, picoseconds, atomic mass units,
//! kJ/mol, kelvin and elementary charges.

pub mod forcefield;
pub mod models;
pub mod units;
