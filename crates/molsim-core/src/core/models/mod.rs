//! # Core Models Module
//!
//! This module contains the data structures that describe a simulation, from the static
//! particle system down to the immutable snapshots returned to callers.
//!
//! ## Overview
//!
//! Particles are addressed by dense `usize` indices into flat arrays. Constraints are an
//! index-based edge list over those arrays, so that algorithms walking the constraint
//! graph stay cache-friendly and never chase owning pointers.
//!
//! ## Key Components
//!
//! - [`system`] - The `ParticleSystem`: masses, constraints and registered forces
//! - [`constraint`] - Distance constraint records and constraint-cluster discovery
//! - [`periodic_box`] - Reduced triclinic periodic boxes and the minimum-image convention
//! - [`state`] - The live `SimulationState`, the `DataMask` and `StateSnapshot`
//!
//! ## Usage
//!
//! ```ignore
//! use molsim::core::models::system::ParticleSystem;
//!
//! let mut system = ParticleSystem::new();
//! let a = system.add_particle(16.0)?;
//! let b = system.add_particle(1.0)?;
//! system.add_constraint(a, b, 0.1)?;
//! ```

pub mod constraint;
pub mod periodic_box;
pub mod state;
pub mod system;
