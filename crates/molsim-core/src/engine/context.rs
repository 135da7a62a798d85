use super::config::validate_tolerance;
use super::constraints::{ConstraintSettings, ConstraintSolver};
use super::error::EngineError;
use super::integrator::{Dynamics, Integrator, IntegratorParameters};
use super::platform::{PlatformBackend, ReferencePlatform};
use super::utils::sampling;
use crate::core::forcefield::contributor::ForceGroupMask;
use crate::core::models::periodic_box::PeriodicBox;
use crate::core::models::state::{DataMask, SimulationState, StateSnapshot};
use crate::core::models::system::{ParticleSystem, SystemError};
use nalgebra::{Point3, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The live simulation of one particle system.
///
/// A context owns the mutable [`SimulationState`] and mediates every access to it: the
/// integrator advances it through [`SimulationContext::step`], callers read it through
/// immutable [`StateSnapshot`]s, and every external mutation invalidates whatever the
/// integrator cached. The particle system is shared, so several contexts may run the same
/// system concurrently on different threads.
#[derive(Debug)]
pub struct SimulationContext {
    system: Arc<ParticleSystem>,
    integrator: Box<dyn Integrator>,
    backend: Box<dyn PlatformBackend>,
    constraints: ConstraintSolver,
    state: SimulationState,
}

impl SimulationContext {
    /// Creates a context on the reference platform.
    pub fn new(
        system: Arc<ParticleSystem>,
        integrator: Box<dyn Integrator>,
    ) -> Result<Self, EngineError> {
        Self::with_platform(system, integrator, Box::new(ReferencePlatform::new()))
    }

    /// Creates a context that evaluates forces on `backend`.
    ///
    /// All particles start at the origin, at rest, at time zero, with the system's default
    /// periodic box.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfiguration`] if the system has no particles, needs a
    ///   periodic box it does not define, or has a constraint cluster mixing massless and
    ///   massive particles.
    /// - Any error the backend raises while initializing for the system.
    #[instrument(skip_all, name = "context_init")]
    pub fn with_platform(
        system: Arc<ParticleSystem>,
        integrator: Box<dyn Integrator>,
        mut backend: Box<dyn PlatformBackend>,
    ) -> Result<Self, EngineError> {
        info!(
            particles = system.num_particles(),
            constraints = system.num_constraints(),
            forces = system.num_forces(),
            platform = backend.name(),
            integrator = integrator.name(),
            "Creating simulation context."
        );
        if system.num_particles() == 0 {
            return Err(EngineError::InvalidConfiguration(
                "the system has no particles".to_string(),
            ));
        }
        let periodic_box = system.default_periodic_box().copied();
        check_periodic(&system, periodic_box.as_ref())?;
        let constraints = ConstraintSolver::new(&system)?;
        backend.initialize_for_system(&system)?;

        let state = SimulationState::new(system.num_particles(), periodic_box);
        Ok(Self {
            system,
            integrator,
            backend,
            constraints,
            state,
        })
    }

    pub fn system(&self) -> &Arc<ParticleSystem> {
        &self.system
    }

    pub fn integrator(&self) -> &dyn Integrator {
        self.integrator.as_ref()
    }

    pub fn platform(&self) -> &dyn PlatformBackend {
        self.backend.as_ref()
    }

    pub fn num_particles(&self) -> usize {
        self.state.num_particles()
    }

    /// Elapsed simulated time in ps.
    pub fn time(&self) -> f64 {
        self.state.time()
    }

    pub fn step_count(&self) -> u64 {
        self.state.step_count()
    }

    pub fn periodic_box(&self) -> Option<&PeriodicBox> {
        self.state.periodic_box()
    }

    /// Number of unconstrained degrees of freedom: three per massive particle minus one
    /// per active constraint.
    pub fn degrees_of_freedom(&self) -> usize {
        let massive = self.system.masses().iter().filter(|&&m| m != 0.0).count();
        (3 * massive).saturating_sub(self.constraints.num_active())
    }

    /// Replaces the integrator parameters. Takes effect from the next step.
    pub fn set_integrator_parameters(
        &mut self,
        parameters: IntegratorParameters,
    ) -> Result<(), EngineError> {
        self.integrator.set_parameters(parameters)?;
        self.integrator.state_changed();
        Ok(())
    }

    fn split(&mut self) -> (&mut dyn Integrator, Dynamics<'_>) {
        (
            self.integrator.as_mut(),
            Dynamics {
                system: self.system.as_ref(),
                backend: self.backend.as_mut(),
                constraints: &self.constraints,
                state: &mut self.state,
            },
        )
    }

    /// Advances the simulation by `steps` integration steps.
    ///
    /// Steps are committed one at a time. If a step fails, the steps before it stay
    /// committed, the failing step leaves no trace, and its error is returned.
    #[instrument(skip_all, name = "step", fields(steps = steps))]
    pub fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        let (integrator, mut dynamics) = self.split();
        for completed in 0..steps {
            if let Err(err) = integrator.advance(&mut dynamics) {
                warn!(
                    completed,
                    step = dynamics.state.step_count(),
                    error = %err,
                    "Integration step failed."
                );
                return Err(err);
            }
        }
        debug!(
            time = dynamics.state.time(),
            step = dynamics.state.step_count(),
            "Steps completed."
        );
        Ok(())
    }

    /// Takes a snapshot of the fields selected by `mask`, evaluating every force group.
    pub fn state(&mut self, mask: DataMask) -> Result<StateSnapshot, EngineError> {
        self.state_for_groups(mask, ForceGroupMask::ALL)
    }

    /// Takes a snapshot whose forces and potential energy include only `groups`.
    ///
    /// Forces and energies are computed only when requested. The kinetic energy is the one
    /// the integrator defines for its own velocities.
    #[instrument(skip_all, name = "state_query", fields(mask = mask.bits()))]
    pub fn state_for_groups(
        &mut self,
        mask: DataMask,
        groups: ForceGroupMask,
    ) -> Result<StateSnapshot, EngineError> {
        let state = &self.state;
        let mut snapshot = StateSnapshot {
            mask,
            time: state.time,
            step_count: state.step_count,
            periodic_box: state.periodic_box,
            positions: mask
                .contains(DataMask::POSITIONS)
                .then(|| state.positions.clone()),
            velocities: mask
                .contains(DataMask::VELOCITIES)
                .then(|| state.velocities.clone()),
            forces: None,
            potential_energy: None,
            kinetic_energy: None,
        };

        let wants_energy = mask.contains(DataMask::ENERGY);
        if wants_energy || mask.contains(DataMask::FORCES) {
            let (integrator, mut dynamics) = self.split();
            let evaluation = dynamics.backend.compute_forces_and_energy(
                dynamics.system,
                dynamics.state.coordinates(),
                groups,
            )?;
            if wants_energy {
                snapshot.potential_energy = Some(evaluation.potential_energy);
                snapshot.kinetic_energy = Some(integrator.kinetic_energy(&mut dynamics)?);
            }
            if mask.contains(DataMask::FORCES) {
                snapshot.forces = Some(evaluation.forces);
            }
        }
        Ok(snapshot)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] unless there is one position per particle.
    pub fn set_positions(&mut self, positions: &[Point3<f64>]) -> Result<(), EngineError> {
        self.check_length("positions", positions.len())?;
        self.state.positions.copy_from_slice(positions);
        self.integrator.state_changed();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] unless there is one velocity per particle.
    pub fn set_velocities(&mut self, velocities: &[Vector3<f64>]) -> Result<(), EngineError> {
        self.check_length("velocities", velocities.len())?;
        self.state.velocities.copy_from_slice(velocities);
        self.integrator.state_changed();
        Ok(())
    }

    /// Draws velocities from a Maxwell–Boltzmann distribution at `temperature` (K).
    ///
    /// The draw is reproducible for a given `seed`. Massless particles are left at rest.
    /// The velocities are projected onto the velocity constraints and then rescaled so the
    /// instantaneous temperature over [`Self::degrees_of_freedom`] equals `temperature`.
    #[instrument(skip_all, name = "thermalize", fields(temperature = temperature, seed = seed))]
    pub fn set_velocities_to_temperature(
        &mut self,
        temperature: f64,
        seed: u64,
    ) -> Result<(), EngineError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let masses = self.system.masses();
        let mut velocities =
            sampling::maxwell_boltzmann_velocities(masses, temperature, &mut rng)?;
        let settings = self.integrator.parameters().constraints;
        self.constraints
            .apply_to_velocities(&self.state.positions, &mut velocities, &settings)?;

        let dof = self.degrees_of_freedom();
        let current = sampling::temperature_from_kinetic_energy(
            sampling::kinetic_energy(masses, &velocities),
            dof,
        );
        if current > 0.0 {
            let scale = (temperature / current).sqrt();
            velocities.iter_mut().for_each(|v| *v *= scale);
        }
        debug!(sampled = current, dof, "Velocities initialized.");

        self.state.velocities = velocities;
        self.integrator.state_changed();
        Ok(())
    }

    /// Sets or clears the periodic box.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfiguration`] when clearing the box of a system
    /// whose forces need one.
    pub fn set_periodic_box(
        &mut self,
        periodic_box: Option<PeriodicBox>,
    ) -> Result<(), EngineError> {
        check_periodic(&self.system, periodic_box.as_ref())?;
        self.state.periodic_box = periodic_box;
        self.integrator.state_changed();
        Ok(())
    }

    /// Projects the current positions onto the constraints to within `tolerance`.
    pub fn apply_constraints(&mut self, tolerance: f64) -> Result<(), EngineError> {
        let settings = self.constraint_settings(tolerance)?;
        let reference = self.state.positions.clone();
        let mut positions = reference.clone();
        self.constraints
            .apply_to_positions(&reference, &mut positions, &settings)?;
        self.state.positions = positions;
        self.integrator.state_changed();
        Ok(())
    }

    /// Removes velocity components along the constraints to within `tolerance`.
    pub fn apply_velocity_constraints(&mut self, tolerance: f64) -> Result<(), EngineError> {
        let settings = self.constraint_settings(tolerance)?;
        let mut velocities = self.state.velocities.clone();
        self.constraints
            .apply_to_velocities(&self.state.positions, &mut velocities, &settings)?;
        self.state.velocities = velocities;
        self.integrator.state_changed();
        Ok(())
    }

    /// Changes the particle system between steps.
    ///
    /// `action` edits a private copy of the system. The copy is then checked the way a
    /// new context would check it and the platform is re-initialized for it; only when all
    /// of that succeeds does the context switch to the edited system. Otherwise the
    /// context keeps running the old system and the error is returned. The particle count
    /// cannot change.
    #[instrument(skip_all, name = "modify_system")]
    pub fn modify_system<F>(&mut self, action: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut ParticleSystem) -> Result<(), SystemError>,
    {
        let mut system = ParticleSystem::clone(&self.system);
        action(&mut system)?;
        if system.num_particles() != self.state.num_particles() {
            return Err(EngineError::DimensionMismatch {
                what: "particles",
                expected: self.state.num_particles(),
                actual: system.num_particles(),
            });
        }
        check_periodic(&system, self.state.periodic_box.as_ref())?;
        let constraints = ConstraintSolver::new(&system)?;
        if let Err(err) = self.backend.initialize_for_system(&system) {
            self.backend.initialize_for_system(&self.system)?;
            return Err(err);
        }

        self.system = Arc::new(system);
        self.constraints = constraints;
        self.integrator.state_changed();
        info!(
            constraints = self.system.num_constraints(),
            forces = self.system.num_forces(),
            "Particle system updated."
        );
        Ok(())
    }

    fn constraint_settings(&self, tolerance: f64) -> Result<ConstraintSettings, EngineError> {
        validate_tolerance(tolerance)?;
        Ok(ConstraintSettings {
            tolerance,
            ..self.integrator.parameters().constraints
        })
    }

    fn check_length(&self, what: &'static str, actual: usize) -> Result<(), EngineError> {
        let expected = self.state.num_particles();
        if actual == expected {
            Ok(())
        } else {
            Err(EngineError::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

fn check_periodic(
    system: &ParticleSystem,
    periodic_box: Option<&PeriodicBox>,
) -> Result<(), EngineError> {
    if system.uses_periodic_boundary_conditions() && periodic_box.is_none() {
        return Err(EngineError::InvalidConfiguration(
            "the system uses periodic boundary conditions but no periodic box is set".to_string(),
        ));
    }
    Ok(())
}
