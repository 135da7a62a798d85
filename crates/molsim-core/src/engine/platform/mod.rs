//! # Platform Module
//!
//! A platform is the numeric backend that turns coordinates into forces and a potential
//! energy. Integrators and the simulation context talk only to the [`PlatformBackend`]
//! trait, so backends can be swapped without touching the dynamics.
//!
//! ## Key Components
//!
//! - [`PlatformBackend`] - The backend contract
//! - [`reference::ReferencePlatform`] - Sequential scalar evaluation, the ground truth
//! - [`cpu::CpuPlatform`] - Contributor-parallel evaluation with a fixed-order reduction
//! - [`create_platform`] - Construction by [`PlatformKind`]

pub mod cpu;
pub mod reference;

pub use crate::core::models::state::Coordinates;
pub use cpu::CpuPlatform;
pub use reference::ReferencePlatform;

use super::error::EngineError;
use crate::core::forcefield::contributor::{ForceError, ForceGroupMask};
use crate::core::models::system::{ParticleSystem, RegisteredForce};
use nalgebra::Vector3;
use serde::Deserialize;
use std::fmt;

/// Identifies a platform implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    #[default]
    Reference,
    Cpu,
    /// Accelerator backend. Declared for configuration compatibility; no implementation
    /// ships with this crate.
    Gpu,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlatformKind::Reference => "reference",
            PlatformKind::Cpu => "cpu",
            PlatformKind::Gpu => "gpu",
        };
        f.write_str(label)
    }
}

/// Forces on every particle and the total potential energy of the selected groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceEvaluation {
    /// Force on each particle in kJ/mol/nm.
    pub forces: Vec<Vector3<f64>>,
    /// Potential energy in kJ/mol.
    pub potential_energy: f64,
}

impl ForceEvaluation {
    pub fn zeros(num_particles: usize) -> Self {
        Self {
            forces: vec![Vector3::zeros(); num_particles],
            potential_energy: 0.0,
        }
    }
}

/// Capacity limits a backend enforces when it is initialized for a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformLimits {
    pub max_particles: Option<usize>,
    pub max_constraints: Option<usize>,
}

impl PlatformLimits {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedSystem`] if `system` exceeds a limit.
    pub fn check(
        &self,
        platform: &'static str,
        system: &ParticleSystem,
    ) -> Result<(), EngineError> {
        if let Some(max) = self.max_particles {
            if system.num_particles() > max {
                return Err(EngineError::UnsupportedSystem {
                    platform,
                    reason: format!(
                        "{} particles exceed the limit of {max}",
                        system.num_particles()
                    ),
                });
            }
        }
        if let Some(max) = self.max_constraints {
            if system.num_constraints() > max {
                return Err(EngineError::UnsupportedSystem {
                    platform,
                    reason: format!(
                        "{} constraints exceed the limit of {max}",
                        system.num_constraints()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The force/energy evaluation contract every backend fulfils.
///
/// `compute_forces_and_energy` must be a pure function of the coordinates and the group
/// mask: two calls with identical inputs return bit-identical results.
pub trait PlatformBackend: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn kind(&self) -> PlatformKind;

    /// Prepares the backend for `system` and checks that it can be evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedSystem`] when a backend limit is exceeded and
    /// [`EngineError::ForceEvaluation`] when a contributor rejects the system.
    fn initialize_for_system(&mut self, system: &ParticleSystem) -> Result<(), EngineError>;

    /// Evaluates the contributors whose group is in `groups`.
    fn compute_forces_and_energy(
        &mut self,
        system: &ParticleSystem,
        coordinates: Coordinates<'_>,
        groups: ForceGroupMask,
    ) -> Result<ForceEvaluation, EngineError>;
}

/// Creates the backend of the given kind with default limits.
///
/// # Errors
///
/// Returns [`EngineError::PlatformUnavailable`] for kinds without an implementation.
pub fn create_platform(kind: PlatformKind) -> Result<Box<dyn PlatformBackend>, EngineError> {
    match kind {
        PlatformKind::Reference => Ok(Box::new(ReferencePlatform::new())),
        PlatformKind::Cpu => Ok(Box::new(CpuPlatform::new())),
        PlatformKind::Gpu => Err(EngineError::PlatformUnavailable(kind)),
    }
}

/// Validates every contributor against the particle count.
pub(crate) fn validate_contributors(system: &ParticleSystem) -> Result<(), EngineError> {
    let count = system.num_particles();
    for force in system.forces() {
        force.contributor().validate(count)?;
    }
    Ok(())
}

/// Runs one contributor into `forces` and rejects non-finite output.
pub(crate) fn accumulate_checked(
    force: &RegisteredForce,
    coordinates: Coordinates<'_>,
    forces: &mut [Vector3<f64>],
) -> Result<f64, ForceError> {
    let contributor = force.contributor();
    let energy = contributor.accumulate(coordinates.positions, coordinates.periodic_box, forces)?;
    if !energy.is_finite() || forces.iter().any(|f| !f.iter().all(|c| c.is_finite())) {
        return Err(ForceError::NonFinite {
            force: contributor.name(),
        });
    }
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_with(num_particles: usize, num_constraints: usize) -> ParticleSystem {
        let mut system = ParticleSystem::new();
        for _ in 0..num_particles {
            system.add_particle(1.0).unwrap();
        }
        for i in 0..num_constraints {
            system.add_constraint(i, i + 1, 1.0).unwrap();
        }
        system
    }

    #[test]
    fn limits_reject_oversized_systems() {
        let limits = PlatformLimits {
            max_particles: Some(3),
            max_constraints: Some(1),
        };
        assert!(limits.check("test", &system_with(3, 1)).is_ok());
        assert!(matches!(
            limits.check("test", &system_with(4, 0)),
            Err(EngineError::UnsupportedSystem { .. })
        ));
        assert!(matches!(
            limits.check("test", &system_with(3, 2)),
            Err(EngineError::UnsupportedSystem { .. })
        ));
        assert!(
            PlatformLimits::unlimited()
                .check("test", &system_with(50, 49))
                .is_ok()
        );
    }

    #[test]
    fn create_platform_builds_available_backends() {
        assert_eq!(
            create_platform(PlatformKind::Reference).unwrap().kind(),
            PlatformKind::Reference
        );
        assert_eq!(
            create_platform(PlatformKind::Cpu).unwrap().kind(),
            PlatformKind::Cpu
        );
        assert_eq!(
            create_platform(PlatformKind::Gpu).unwrap_err(),
            EngineError::PlatformUnavailable(PlatformKind::Gpu)
        );
    }

    #[test]
    fn platform_kind_display_matches_config_names() {
        assert_eq!(PlatformKind::Cpu.to_string(), "cpu");
        assert_eq!(PlatformKind::default(), PlatformKind::Reference);
    }
}
