use super::{Dynamics, Integrator, IntegratorParameters, StepBuffers, velocities_from_displacement};
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling;

/// Leapfrog Verlet integration with SHAKE constraints.
///
/// Stored velocities lag the positions by half a step. Each step performs a single force
/// evaluation: `v ← v + Δt·F/m`, `x' ← x + Δt·v`, SHAKE on `x'`, then `v ← (x' − x)/Δt`.
/// The reported kinetic energy uses the on-step estimate `v + ½Δt·F/m`, projected onto
/// the velocity constraints.
#[derive(Debug, Clone)]
pub struct VerletIntegrator {
    parameters: IntegratorParameters,
    buffers: StepBuffers,
}

impl VerletIntegrator {
    /// Creates an integrator with the given step size (ps) and default constraint
    /// settings.
    pub fn new(step_size: f64) -> Result<Self, ConfigError> {
        Self::with_parameters(IntegratorParameters::new(step_size))
    }

    pub fn with_parameters(parameters: IntegratorParameters) -> Result<Self, ConfigError> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            buffers: StepBuffers::default(),
        })
    }
}

impl Integrator for VerletIntegrator {
    fn name(&self) -> &'static str {
        "Verlet"
    }

    fn parameters(&self) -> &IntegratorParameters {
        &self.parameters
    }

    fn set_parameters(&mut self, parameters: IntegratorParameters) -> Result<(), ConfigError> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(())
    }

    fn state_changed(&mut self) {}

    fn advance(&mut self, dynamics: &mut Dynamics<'_>) -> Result<(), EngineError> {
        let dt = self.parameters.step_size;
        let evaluation = dynamics.forces_at_current_positions(self.parameters.force_groups)?;
        let inverse_masses = dynamics.constraints.inverse_masses();

        let buffers = &mut self.buffers;
        buffers.load(dynamics.state);
        for (i, &w) in inverse_masses.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            buffers.velocities[i] += evaluation.forces[i] * (dt * w);
            buffers.positions[i] += buffers.velocities[i] * dt;
        }

        if !dynamics.constraints.is_empty() {
            dynamics.constraints.apply_to_positions(
                &dynamics.state.positions,
                &mut buffers.positions,
                &self.parameters.constraints,
            )?;
            velocities_from_displacement(
                inverse_masses,
                &dynamics.state.positions,
                &buffers.positions,
                &mut buffers.velocities,
                dt,
            );
        }

        buffers.commit(dynamics.state, dt);
        Ok(())
    }

    fn kinetic_energy(&mut self, dynamics: &mut Dynamics<'_>) -> Result<f64, EngineError> {
        let half_dt = 0.5 * self.parameters.step_size;
        let evaluation = dynamics.forces_at_current_positions(self.parameters.force_groups)?;
        let inverse_masses = dynamics.constraints.inverse_masses();

        let mut velocities = dynamics.state.velocities.clone();
        for (i, &w) in inverse_masses.iter().enumerate() {
            if w != 0.0 {
                velocities[i] += evaluation.forces[i] * (half_dt * w);
            }
        }
        dynamics.constraints.apply_to_velocities(
            &dynamics.state.positions,
            &mut velocities,
            &self.parameters.constraints,
        )?;
        Ok(sampling::kinetic_energy(dynamics.system.masses(), &velocities))
    }
}
