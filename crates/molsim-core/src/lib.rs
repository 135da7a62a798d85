//! # molsim Core Library
//!
//! A constrained molecular-dynamics execution engine: it advances a particle system through
//! time under forces evaluated by a pluggable numeric platform, while holding rigid
//! distance constraints with SHAKE/RATTLE projection.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that each concern can be tested
//! and swapped in isolation.
//!
//! - **[`core`]: The Foundation.** Stateless descriptions of what is simulated: the
//!   `ParticleSystem` (masses, constraints, registered force contributors), the live
//!   `SimulationState` and its immutable `StateSnapshot` copies, periodic boxes, and the
//!   concrete force contributors with their pure potential functions.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery that moves a system forward:
//!   the `PlatformBackend` contract and its CPU implementations, the `ConstraintSolver`,
//!   the `Integrator` schemes, and the `SimulationContext` that owns the live state and
//!   mediates between all of them.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the engine, such as
//!   running a trajectory and recording frames at a fixed interval.

pub mod core;
pub mod engine;
pub mod workflows;
