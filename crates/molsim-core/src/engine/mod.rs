//! # Engine Module
//!
//! This module holds the stateful machinery that moves a particle system through time.
//!
//! ## Overview
//!
//! A [`context::SimulationContext`] owns the live state of one simulation and connects
//! three collaborators:
//!
//! - a [`platform::PlatformBackend`] that evaluates forces and potential energy,
//! - a [`constraints::ConstraintSolver`] that projects positions and velocities onto the
//!   distance constraints (SHAKE/RATTLE),
//! - an [`integrator::Integrator`] that combines the two into a time-stepping scheme.
//!
//! ## Features
//!
//! - **Transactional stepping** - each step is staged in scratch buffers and committed
//!   only when every phase succeeds
//! - **Pluggable platforms** - a sequential reference backend and a rayon-parallel CPU
//!   backend with a deterministic reduction order
//! - **Force groups** - integrators and state queries can restrict evaluation to a subset
//!   of contributors
//! - **Reproducible thermalization** - seeded Maxwell–Boltzmann velocity initialization
//! - **Configuration** - builder and TOML loading for integrator and run parameters
//! - **Progress monitoring** - callback-based event reporting for long runs

pub mod config;
pub mod constraints;
pub mod context;
pub mod error;
pub mod integrator;
pub mod platform;
pub mod progress;
pub(crate) mod utils;
