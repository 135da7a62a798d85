use super::contributor::{ForceContributor, ForceError, check_particle};
use crate::core::models::periodic_box::PeriodicBox;
use nalgebra::{Point3, Vector3};

const NAME: &str = "ExternalFieldForce";

/// A uniform linear field acting on selected particles.
///
/// Each selected particle `i` with scale `s_i` gains `E_i = s_i·(g·r_i)` and feels the
/// force `F_i = −s_i·g`, where `g` is the field vector in kJ/mol/nm.
#[derive(Debug, Clone)]
pub struct ExternalFieldForce {
    field: Vector3<f64>,
    particles: Vec<(usize, f64)>,
}

impl ExternalFieldForce {
    pub fn new(field: Vector3<f64>) -> Self {
        Self {
            field,
            particles: Vec::new(),
        }
    }

    pub fn field(&self) -> Vector3<f64> {
        self.field
    }

    /// Applies the field to a particle with the given scale and returns the term index.
    pub fn add_particle(&mut self, particle: usize, scale: f64) -> usize {
        self.particles.push((particle, scale));
        self.particles.len() - 1
    }

    pub fn particles(&self) -> &[(usize, f64)] {
        &self.particles
    }
}

impl ForceContributor for ExternalFieldForce {
    fn name(&self) -> &'static str {
        NAME
    }

    fn validate(&self, num_particles: usize) -> Result<(), ForceError> {
        for &(index, scale) in &self.particles {
            check_particle(NAME, index, num_particles)?;
            if !scale.is_finite() {
                return Err(ForceError::InvalidParameter {
                    force: NAME,
                    reason: format!("particle {index} has a non-finite scale"),
                });
            }
        }
        Ok(())
    }

    fn accumulate(
        &self,
        positions: &[Point3<f64>],
        _periodic_box: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let mut energy = 0.0;
        for &(index, scale) in &self.particles {
            energy += scale * self.field.dot(&positions[index].coords);
            forces[index] -= self.field * scale;
        }
        Ok(energy)
    }
}
