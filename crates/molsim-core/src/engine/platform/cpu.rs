use super::{
    Coordinates, ForceEvaluation, PlatformBackend, PlatformKind, PlatformLimits,
    accumulate_checked, validate_contributors,
};
use crate::core::forcefield::contributor::ForceGroupMask;
use crate::core::models::system::{ParticleSystem, RegisteredForce};
use crate::engine::error::EngineError;
use nalgebra::Vector3;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type PartialResult = Result<(Vec<Vector3<f64>>, f64), EngineError>;

/// Evaluates each selected contributor into its own buffer, in parallel when the
/// `parallel` feature is enabled, then reduces the buffers in registration order.
///
/// The fixed reduction order makes results independent of thread scheduling, so repeated
/// evaluations are bit-identical.
#[derive(Debug, Clone, Default)]
pub struct CpuPlatform {
    limits: PlatformLimits,
}

impl CpuPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: PlatformLimits) -> Self {
        Self { limits }
    }
}

fn evaluate_one(force: &RegisteredForce, coordinates: Coordinates<'_>) -> PartialResult {
    let mut forces = vec![Vector3::zeros(); coordinates.positions.len()];
    let energy = accumulate_checked(force, coordinates, &mut forces)?;
    Ok((forces, energy))
}

impl PlatformBackend for CpuPlatform {
    fn name(&self) -> &'static str {
        "CPU"
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Cpu
    }

    fn initialize_for_system(&mut self, system: &ParticleSystem) -> Result<(), EngineError> {
        self.limits.check(self.name(), system)?;
        validate_contributors(system)?;
        debug!(
            particles = system.num_particles(),
            forces = system.num_forces(),
            parallel = cfg!(feature = "parallel"),
            "CPU platform initialized."
        );
        Ok(())
    }

    fn compute_forces_and_energy(
        &mut self,
        system: &ParticleSystem,
        coordinates: Coordinates<'_>,
        groups: ForceGroupMask,
    ) -> Result<ForceEvaluation, EngineError> {
        let selected: Vec<&RegisteredForce> = system
            .forces()
            .iter()
            .filter(|f| groups.contains(f.group()))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let iterator = selected.iter();

        #[cfg(feature = "parallel")]
        let iterator = selected.par_iter();

        let partials: Vec<PartialResult> = iterator
            .map(|force| evaluate_one(force, coordinates))
            .collect();

        let mut buffers = Vec::with_capacity(partials.len());
        let mut result = ForceEvaluation::zeros(coordinates.positions.len());
        for partial in partials {
            let (forces, energy) = partial?;
            result.potential_energy += energy;
            buffers.push(forces);
        }

        #[cfg(not(feature = "parallel"))]
        let targets = result.forces.iter_mut();

        #[cfg(feature = "parallel")]
        let targets = result.forces.par_iter_mut();

        targets.enumerate().for_each(|(i, total)| {
            for buffer in &buffers {
                *total += buffer[i];
            }
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::bonded::HarmonicBondForce;
    use crate::core::forcefield::nonbonded::NonbondedForce;
    use crate::engine::platform::reference::ReferencePlatform;
    use nalgebra::Point3;

    fn charged_chain(n: usize) -> (ParticleSystem, Vec<Point3<f64>>) {
        let mut system = ParticleSystem::new();
        let mut bonds = HarmonicBondForce::new();
        let mut nonbonded = NonbondedForce::new();
        let mut positions = Vec::with_capacity(n);
        for i in 0..n {
            system.add_particle(12.0).unwrap();
            let charge = if i % 2 == 0 { 0.3 } else { -0.3 };
            nonbonded.add_particle(charge, 0.3, 0.5);
            positions.push(Point3::new(0.31 * i as f64, 0.05 * (i % 3) as f64, 0.0));
            if i > 0 {
                bonds.add_bond(i - 1, i, 0.3, 1000.0);
            }
        }
        system.add_force(bonds);
        system.add_force(nonbonded);
        (system, positions)
    }

    #[test]
    fn agrees_with_the_reference_platform() {
        let (system, positions) = charged_chain(12);
        let coords = Coordinates {
            positions: &positions,
            periodic_box: None,
        };
        let mut reference = ReferencePlatform::new();
        let mut cpu = CpuPlatform::new();
        reference.initialize_for_system(&system).unwrap();
        cpu.initialize_for_system(&system).unwrap();

        let expected = reference
            .compute_forces_and_energy(&system, coords, ForceGroupMask::ALL)
            .unwrap();
        let actual = cpu
            .compute_forces_and_energy(&system, coords, ForceGroupMask::ALL)
            .unwrap();

        let scale = expected.potential_energy.abs().max(1.0);
        assert!((expected.potential_energy - actual.potential_energy).abs() / scale < 1e-12);
        for (e, a) in expected.forces.iter().zip(&actual.forces) {
            assert!((e - a).norm() <= 1e-9 * e.norm().max(1.0));
        }
    }

    #[test]
    fn repeated_evaluation_is_bit_identical() {
        let (system, positions) = charged_chain(20);
        let coords = Coordinates {
            positions: &positions,
            periodic_box: None,
        };
        let mut cpu = CpuPlatform::new();
        let first = cpu
            .compute_forces_and_energy(&system, coords, ForceGroupMask::ALL)
            .unwrap();
        let second = cpu
            .compute_forces_and_energy(&system, coords, ForceGroupMask::ALL)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn limits_are_enforced_on_initialization() {
        let (system, _) = charged_chain(5);
        let mut cpu = CpuPlatform::with_limits(PlatformLimits {
            max_particles: Some(4),
            max_constraints: None,
        });
        assert!(matches!(
            cpu.initialize_for_system(&system),
            Err(EngineError::UnsupportedSystem { platform: "CPU", .. })
        ));
    }
}
