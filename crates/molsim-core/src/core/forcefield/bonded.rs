use super::contributor::{ForceContributor, ForceError, check_particle};
use super::potentials;
use crate::core::models::periodic_box::PeriodicBox;
use nalgebra::{Point3, Vector3};

const NAME: &str = "HarmonicBondForce";

/// A single harmonic bond.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicBond {
    pub particle_a: usize,
    pub particle_b: usize,
    /// Rest length in nm.
    pub length: f64,
    /// Force constant in kJ/mol/nm².
    pub k: f64,
}

/// Harmonic springs between particle pairs, `E = ½k(r − r0)²` per bond.
#[derive(Debug, Clone, Default)]
pub struct HarmonicBondForce {
    bonds: Vec<HarmonicBond>,
    periodic: bool,
}

impl HarmonicBondForce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bond and returns its index.
    pub fn add_bond(&mut self, particle_a: usize, particle_b: usize, length: f64, k: f64) -> usize {
        self.bonds.push(HarmonicBond {
            particle_a,
            particle_b,
            length,
            k,
        });
        self.bonds.len() - 1
    }

    pub fn bonds(&self) -> &[HarmonicBond] {
        &self.bonds
    }

    /// Measures bond vectors with the minimum-image convention when enabled.
    pub fn set_uses_periodic_boundary_conditions(&mut self, periodic: bool) {
        self.periodic = periodic;
    }
}

impl ForceContributor for HarmonicBondForce {
    fn name(&self) -> &'static str {
        NAME
    }

    fn uses_periodic_boundary_conditions(&self) -> bool {
        self.periodic
    }

    fn validate(&self, num_particles: usize) -> Result<(), ForceError> {
        for bond in &self.bonds {
            check_particle(NAME, bond.particle_a, num_particles)?;
            check_particle(NAME, bond.particle_b, num_particles)?;
            if !(bond.length.is_finite() && bond.k.is_finite()) {
                return Err(ForceError::InvalidParameter {
                    force: NAME,
                    reason: format!(
                        "bond {}-{} has non-finite parameters",
                        bond.particle_a, bond.particle_b
                    ),
                });
            }
        }
        Ok(())
    }

    fn accumulate(
        &self,
        positions: &[Point3<f64>],
        periodic_box: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let pbox = match (self.periodic, periodic_box) {
            (true, None) => return Err(ForceError::MissingPeriodicBox { force: NAME }),
            (true, Some(b)) => Some(b),
            (false, _) => None,
        };

        let mut energy = 0.0;
        for bond in &self.bonds {
            let mut delta = positions[bond.particle_b] - positions[bond.particle_a];
            if let Some(b) = pbox {
                delta = b.minimum_image(delta);
            }
            let dist = delta.norm();
            let (e, de_dr) = potentials::harmonic(dist, bond.length, bond.k);
            energy += e;
            if dist > 0.0 {
                let f = delta * (de_dr / dist);
                forces[bond.particle_a] += f;
                forces[bond.particle_b] -= f;
            }
        }
        Ok(energy)
    }
}
