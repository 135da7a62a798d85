use crate::core::units::BOLTZMANN;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Temperature must be finite and non-negative, got {0} K")]
    InvalidTemperature(f64),
}

/// Draws velocities from the Maxwell–Boltzmann distribution at `temperature`.
///
/// Each Cartesian component of a massive particle is normal with standard deviation
/// `sqrt(kT/m)`. Massless particles get zero velocity and consume no random numbers, so
/// the sequence drawn for massive particles does not depend on where fixed particles sit.
pub fn maxwell_boltzmann_velocities<R: Rng + ?Sized>(
    masses: &[f64],
    temperature: f64,
    rng: &mut R,
) -> Result<Vec<Vector3<f64>>, SamplingError> {
    if !(temperature.is_finite() && temperature >= 0.0) {
        return Err(SamplingError::InvalidTemperature(temperature));
    }
    let kt = BOLTZMANN * temperature;
    Ok(masses
        .iter()
        .map(|&mass| {
            if mass == 0.0 {
                return Vector3::zeros();
            }
            let sigma = (kt / mass).sqrt();
            Vector3::new(
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
            ) * sigma
        })
        .collect())
}

/// Kinetic energy `Σ ½m|v|²` in kJ/mol. Massless particles contribute nothing.
pub fn kinetic_energy(masses: &[f64], velocities: &[Vector3<f64>]) -> f64 {
    masses
        .iter()
        .zip(velocities)
        .filter(|(m, _)| **m != 0.0)
        .fold(0.0, |acc, (m, v)| acc + 0.5 * m * v.norm_squared())
}

/// Instantaneous temperature for a kinetic energy spread over `degrees_of_freedom`.
pub fn temperature_from_kinetic_energy(kinetic_energy: f64, degrees_of_freedom: usize) -> f64 {
    if degrees_of_freedom == 0 {
        return 0.0;
    }
    2.0 * kinetic_energy / (degrees_of_freedom as f64 * BOLTZMANN)
}
