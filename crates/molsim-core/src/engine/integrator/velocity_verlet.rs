use super::{Dynamics, Integrator, IntegratorParameters, StepBuffers, velocities_from_displacement};
use crate::core::models::state::Coordinates;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling;
use nalgebra::Vector3;
use tracing::trace;

/// Velocity Verlet integration with SHAKE positions and RATTLE velocities.
///
/// Velocities are on-step. A step is: half kick with the cached forces, drift, SHAKE,
/// velocities from the constrained displacement, force evaluation at the new positions,
/// second half kick, RATTLE. The forces at the committed positions are kept for the next
/// step and dropped whenever the state is changed from outside.
#[derive(Debug, Clone)]
pub struct VelocityVerletIntegrator {
    parameters: IntegratorParameters,
    buffers: StepBuffers,
    cached_forces: Option<Vec<Vector3<f64>>>,
}

impl VelocityVerletIntegrator {
    pub fn new(step_size: f64) -> Result<Self, ConfigError> {
        Self::with_parameters(IntegratorParameters::new(step_size))
    }

    pub fn with_parameters(parameters: IntegratorParameters) -> Result<Self, ConfigError> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            buffers: StepBuffers::default(),
            cached_forces: None,
        })
    }
}

impl Integrator for VelocityVerletIntegrator {
    fn name(&self) -> &'static str {
        "VelocityVerlet"
    }

    fn parameters(&self) -> &IntegratorParameters {
        &self.parameters
    }

    fn set_parameters(&mut self, parameters: IntegratorParameters) -> Result<(), ConfigError> {
        parameters.validate()?;
        if parameters.force_groups != self.parameters.force_groups {
            self.cached_forces = None;
        }
        self.parameters = parameters;
        Ok(())
    }

    fn state_changed(&mut self) {
        self.cached_forces = None;
    }

    fn advance(&mut self, dynamics: &mut Dynamics<'_>) -> Result<(), EngineError> {
        let dt = self.parameters.step_size;
        let half_dt = 0.5 * dt;
        let groups = self.parameters.force_groups;

        let forces = match self.cached_forces.take() {
            Some(forces) => forces,
            None => {
                trace!("Evaluating forces at the committed positions.");
                dynamics.forces_at_current_positions(groups)?.forces
            }
        };
        let result = self.integrate(dynamics, &forces, dt, half_dt);
        match result {
            Ok(new_forces) => {
                self.buffers.commit(dynamics.state, dt);
                self.cached_forces = Some(new_forces);
                Ok(())
            }
            Err(err) => {
                self.cached_forces = Some(forces);
                Err(err)
            }
        }
    }

    fn kinetic_energy(&mut self, dynamics: &mut Dynamics<'_>) -> Result<f64, EngineError> {
        Ok(sampling::kinetic_energy(
            dynamics.system.masses(),
            &dynamics.state.velocities,
        ))
    }
}

impl VelocityVerletIntegrator {
    /// Fills the staging buffers with the next state and returns the forces at the new
    /// positions. The live state is only read.
    fn integrate(
        &mut self,
        dynamics: &mut Dynamics<'_>,
        forces: &[Vector3<f64>],
        dt: f64,
        half_dt: f64,
    ) -> Result<Vec<Vector3<f64>>, EngineError> {
        let inverse_masses = dynamics.constraints.inverse_masses();
        let buffers = &mut self.buffers;
        buffers.load(dynamics.state);

        for (i, &w) in inverse_masses.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            buffers.velocities[i] += forces[i] * (half_dt * w);
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

        let evaluation = dynamics.backend.compute_forces_and_energy(
            dynamics.system,
            Coordinates {
                positions: &buffers.positions,
                periodic_box: dynamics.state.periodic_box.as_ref(),
            },
            self.parameters.force_groups,
        )?;

        for (i, &w) in inverse_masses.iter().enumerate() {
            if w != 0.0 {
                buffers.velocities[i] += evaluation.forces[i] * (half_dt * w);
            }
        }
        dynamics.constraints.apply_to_velocities(
            &buffers.positions,
            &mut buffers.velocities,
            &self.parameters.constraints,
        )?;
        Ok(evaluation.forces)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::forcefield::contributor::ForceError;
    use crate::core::forcefield::external::ExternalFieldForce;
    use crate::core::models::state::DataMask;
    use crate::core::models::system::ParticleSystem;
    use crate::engine::context::SimulationContext;
    use crate::engine::platform::CpuPlatform;
    use nalgebra::Point3;
    use std::sync::Arc;

    fn context_for(system: ParticleSystem, step_size: f64) -> SimulationContext {
        let integrator = VelocityVerletIntegrator::new(step_size).unwrap();
        SimulationContext::new(Arc::new(system), Box::new(integrator)).unwrap()
    }

    #[test]
    fn single_bond_follows_the_harmonic_solution() {
        let (system, positions) = single_bond();
        let mut context = context_for(system, 0.01);
        context.set_positions(&positions).unwrap();
        let initial_energy = context
            .state(DataMask::ENERGY)
            .unwrap()
            .total_energy()
            .unwrap();

        for _ in 0..1000 {
            let state = context.state(DataMask::ALL).unwrap();
            let time = state.time();
            let expected_dist = 1.5 + 0.5 * time.cos();
            let p = state.positions().unwrap();
            assert_equal_vec(
                Vector3::new(-0.5 * expected_dist, 0.0, 0.0),
                p[0].coords,
                0.02,
            );
            assert_equal_vec(
                Vector3::new(0.5 * expected_dist, 0.0, 0.0),
                p[1].coords,
                0.02,
            );
            let expected_speed = -0.5 * time.sin();
            let v = state.velocities().unwrap();
            assert_equal_vec(Vector3::new(-0.5 * expected_speed, 0.0, 0.0), v[0], 0.02);
            assert_equal_tol(initial_energy, state.total_energy().unwrap(), 0.01);
            context.step(1).unwrap();
        }
        assert_equal_tol(10.0, context.time(), 1e-5);
    }

    #[test]
    fn rattle_keeps_velocities_tangent_to_constraints() {
        let (system, positions) = constrained_clusters();
        let mut context = context_for(system.clone(), 0.001);
        context.set_positions(&positions).unwrap();
        context.set_velocities(&uniform_vectors(7, 3)).unwrap();
        context.step(200).unwrap();

        let state = context
            .state(DataMask::POSITIONS | DataMask::VELOCITIES)
            .unwrap();
        let p = state.positions().unwrap();
        let v = state.velocities().unwrap();
        assert_constraints_hold(&system, p, 2e-5);
        for c in system.constraints() {
            let r = p[c.particle_a] - p[c.particle_b];
            let rv = r.dot(&(v[c.particle_a] - v[c.particle_b]));
            assert!(rv.abs() / r.norm_squared() <= 1e-4);
        }
    }

    #[test]
    fn constrained_chain_conserves_energy() {
        let (system, positions) = constrained_chain(10);
        let mut context = context_for(system.clone(), 0.001);
        context.set_positions(&positions).unwrap();
        context.set_velocities_to_temperature(300.0, 9).unwrap();
        let initial = context
            .state(DataMask::ENERGY)
            .unwrap()
            .total_energy()
            .unwrap();
        for _ in 0..10 {
            context.step(100).unwrap();
            let state = context.state(DataMask::ALL).unwrap();
            assert_constraints_hold(&system, state.positions().unwrap(), 2e-5);
            assert_equal_tol(initial, state.total_energy().unwrap(), 0.01);
        }
    }

    #[test]
    fn failed_step_leaves_the_state_untouched() {
        let mut system = ParticleSystem::new();
        system.add_particle(1.0).unwrap();
        let mut field = ExternalFieldForce::new(Vector3::new(1e300, 0.0, 0.0));
        field.add_particle(0, 1e10);
        system.add_force(field);

        let integrator = VelocityVerletIntegrator::new(0.01).unwrap();
        let mut context = SimulationContext::with_platform(
            Arc::new(system),
            Box::new(integrator),
            Box::new(CpuPlatform::new()),
        )
        .unwrap();
        context
            .set_positions(&[Point3::new(1.0, 0.0, 0.0)])
            .unwrap();

        let before = context
            .state(DataMask::POSITIONS | DataMask::VELOCITIES)
            .unwrap();
        let result = context.step(1);
        assert!(matches!(
            result,
            Err(EngineError::ForceEvaluation {
                source: ForceError::NonFinite { .. }
            })
        ));
        let after = context
            .state(DataMask::POSITIONS | DataMask::VELOCITIES)
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(context.step_count(), 0);
    }

    #[test]
    fn unconverged_constraints_leave_the_state_untouched() {
        let (system, positions) = constrained_clusters();
        let mut parameters = IntegratorParameters::new(0.1);
        parameters.constraints.tolerance = 1e-12;
        parameters.constraints.max_iterations = 1;
        let integrator = VelocityVerletIntegrator::with_parameters(parameters).unwrap();
        let mut context = SimulationContext::new(Arc::new(system), Box::new(integrator)).unwrap();
        context.set_positions(&positions).unwrap();
        context.set_velocities(&uniform_vectors(7, 3)).unwrap();

        let before = context.state(DataMask::ALL).unwrap();
        let result = context.step(1);
        assert!(matches!(
            result,
            Err(EngineError::ConstraintConvergence { .. })
        ));
        let after = context.state(DataMask::ALL).unwrap();
        assert_eq!(before, after);
        assert_eq!(context.step_count(), 0);
        assert_eq!(context.time(), 0.0);
    }

    #[test]
    fn identical_contexts_produce_identical_trajectories() {
        let run = || {
            let (system, positions) = constrained_pairs();
            let integrator = VelocityVerletIntegrator::new(0.001).unwrap();
            let mut context = SimulationContext::with_platform(
                Arc::new(system),
                Box::new(integrator),
                Box::new(CpuPlatform::new()),
            )
            .unwrap();
            context.set_positions(&positions).unwrap();
            context.set_velocities_to_temperature(300.0, 21).unwrap();
            context.step(250).unwrap();
            context.state(DataMask::ALL).unwrap()
        };
        assert_eq!(run(), run());
    }
}
