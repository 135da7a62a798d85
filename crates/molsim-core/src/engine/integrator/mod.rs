//! # Integrator Module
//!
//! Time-stepping schemes that advance a [`SimulationState`] by one step at a time.
//!
//! ## Overview
//!
//! An integrator never owns the state it advances. The simulation context lends it a
//! [`Dynamics`] view for the duration of a single step: the particle system, the platform
//! backend, the constraint solver and the live state. A step works on staging buffers
//! owned by the integrator and swaps them into the live state only after every phase
//! (force evaluation, update, constraint projection) has succeeded, so a failing step
//! leaves the state exactly as it was.
//!
//! ## Key Components
//!
//! - [`Integrator`] - The stepping contract
//! - [`verlet::VerletIntegrator`] - Leapfrog Verlet with SHAKE
//! - [`velocity_verlet::VelocityVerletIntegrator`] - Velocity Verlet with SHAKE/RATTLE
//! - [`create`] - Construction from an [`IntegratorConfig`]

pub mod velocity_verlet;
pub mod verlet;

pub use velocity_verlet::VelocityVerletIntegrator;
pub use verlet::VerletIntegrator;

use super::config::{
    ConfigError, IntegrationScheme, IntegratorConfig, validate_step_size, validate_tolerance,
};
use super::constraints::{ConstraintSettings, ConstraintSolver};
use super::error::EngineError;
use super::platform::{ForceEvaluation, PlatformBackend};
use crate::core::forcefield::contributor::ForceGroupMask;
use crate::core::models::state::SimulationState;
use crate::core::models::system::ParticleSystem;
use nalgebra::{Point3, Vector3};
use std::fmt;

/// Parameters shared by every integration scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorParameters {
    /// Step size in ps.
    pub step_size: f64,
    pub constraints: ConstraintSettings,
    /// Force groups evaluated when computing the forces that drive the dynamics.
    pub force_groups: ForceGroupMask,
}

impl IntegratorParameters {
    /// Parameters with the given step size and default constraint handling.
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            constraints: ConstraintSettings::default(),
            force_groups: ForceGroupMask::ALL,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_step_size(self.step_size)?;
        validate_tolerance(self.constraints.tolerance)?;
        if self.constraints.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_constraint_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&IntegratorConfig> for IntegratorParameters {
    fn from(config: &IntegratorConfig) -> Self {
        Self {
            step_size: config.step_size,
            constraints: config.constraints,
            force_groups: config.force_groups,
        }
    }
}

/// Everything an integrator may touch while taking a step.
pub struct Dynamics<'a> {
    pub system: &'a ParticleSystem,
    pub backend: &'a mut dyn PlatformBackend,
    pub constraints: &'a ConstraintSolver,
    pub state: &'a mut SimulationState,
}

impl Dynamics<'_> {
    /// Evaluates the forces at the live positions for `groups`.
    pub fn forces_at_current_positions(
        &mut self,
        groups: ForceGroupMask,
    ) -> Result<ForceEvaluation, EngineError> {
        self.backend
            .compute_forces_and_energy(self.system, self.state.coordinates(), groups)
    }
}

pub trait Integrator: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn parameters(&self) -> &IntegratorParameters;

    /// Replaces the parameters. Takes effect from the next step.
    fn set_parameters(&mut self, parameters: IntegratorParameters) -> Result<(), ConfigError>;

    /// Notifies the integrator that positions, velocities, the box or the system changed
    /// outside of a step, invalidating anything it cached.
    fn state_changed(&mut self);

    /// Advances the state by one step, or leaves it untouched and returns the error.
    fn advance(&mut self, dynamics: &mut Dynamics<'_>) -> Result<(), EngineError>;

    /// Kinetic energy (kJ/mol) of the live state as this scheme defines it.
    fn kinetic_energy(&mut self, dynamics: &mut Dynamics<'_>) -> Result<f64, EngineError>;

    fn step_size(&self) -> f64 {
        self.parameters().step_size
    }
}

/// Creates the integrator described by `config`.
pub fn create(config: &IntegratorConfig) -> Result<Box<dyn Integrator>, ConfigError> {
    let parameters = IntegratorParameters::from(config);
    Ok(match config.scheme {
        IntegrationScheme::Leapfrog => Box::new(VerletIntegrator::with_parameters(parameters)?),
        IntegrationScheme::VelocityVerlet => {
            Box::new(VelocityVerletIntegrator::with_parameters(parameters)?)
        }
    })
}

/// Staging copies of positions and velocities for one step.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepBuffers {
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
}

impl StepBuffers {
    pub fn load(&mut self, state: &SimulationState) {
        self.positions.clone_from(&state.positions);
        self.velocities.clone_from(&state.velocities);
    }

    /// Swaps the buffers into `state` and advances its clock by one step.
    pub fn commit(&mut self, state: &mut SimulationState, step_size: f64) {
        std::mem::swap(&mut self.positions, &mut state.positions);
        std::mem::swap(&mut self.velocities, &mut state.velocities);
        state.time += step_size;
        state.step_count += 1;
    }
}

/// Replaces the velocity of every massive particle with its constrained displacement
/// over one step.
pub(crate) fn velocities_from_displacement(
    inverse_masses: &[f64],
    before: &[Point3<f64>],
    after: &[Point3<f64>],
    velocities: &mut [Vector3<f64>],
    step_size: f64,
) {
    let inv_dt = 1.0 / step_size;
    for i in 0..velocities.len() {
        if inverse_masses[i] != 0.0 {
            velocities[i] = (after[i] - before[i]) * inv_dt;
        }
    }
}
