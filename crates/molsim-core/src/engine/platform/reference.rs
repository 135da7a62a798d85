use super::{
    Coordinates, ForceEvaluation, PlatformBackend, PlatformKind, PlatformLimits,
    accumulate_checked, validate_contributors,
};
use crate::core::forcefield::contributor::ForceGroupMask;
use crate::core::models::system::ParticleSystem;
use crate::engine::error::EngineError;
use tracing::debug;

/// Evaluates contributors one after another into a single force buffer.
#[derive(Debug, Clone, Default)]
pub struct ReferencePlatform {
    limits: PlatformLimits,
}

impl ReferencePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: PlatformLimits) -> Self {
        Self { limits }
    }
}

impl PlatformBackend for ReferencePlatform {
    fn name(&self) -> &'static str {
        "Reference"
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Reference
    }

    fn initialize_for_system(&mut self, system: &ParticleSystem) -> Result<(), EngineError> {
        self.limits.check(self.name(), system)?;
        validate_contributors(system)?;
        debug!(
            particles = system.num_particles(),
            forces = system.num_forces(),
            "Reference platform initialized."
        );
        Ok(())
    }

    fn compute_forces_and_energy(
        &mut self,
        system: &ParticleSystem,
        coordinates: Coordinates<'_>,
        groups: ForceGroupMask,
    ) -> Result<ForceEvaluation, EngineError> {
        let mut result = ForceEvaluation::zeros(coordinates.positions.len());
        for force in system.forces() {
            if !groups.contains(force.group()) {
                continue;
            }
            result.potential_energy += accumulate_checked(force, coordinates, &mut result.forces)?;
        }
        Ok(result)
    }
}
