use crate::core::units::COULOMB_CONSTANT;

/// Harmonic spring `E = ½k(r − r0)²`. Returns `(energy, dE/dr)`.
#[inline]
pub fn harmonic(dist: f64, length: f64, k: f64) -> (f64, f64) {
    let stretch = dist - length;
    (0.5 * k * stretch * stretch, k * stretch)
}

/// Lennard-Jones 12-6 `E = 4ε[(σ/r)¹² − (σ/r)⁶]`. Returns `(energy, dE/dr)`.
#[inline]
pub fn lennard_jones_12_6(dist: f64, sigma: f64, epsilon: f64) -> (f64, f64) {
    if epsilon == 0.0 {
        return (0.0, 0.0);
    }
    let sr = sigma / dist;
    let sr6 = sr.powi(6);
    let sr12 = sr6 * sr6;
    let energy = 4.0 * epsilon * (sr12 - sr6);
    let de_dr = -24.0 * epsilon * (2.0 * sr12 - sr6) / dist;
    (energy, de_dr)
}

/// Coulomb interaction `E = k·q1q2/r` for a product of charges. Returns `(energy, dE/dr)`.
#[inline]
pub fn coulomb(dist: f64, charge_product: f64) -> (f64, f64) {
    if charge_product == 0.0 {
        return (0.0, 0.0);
    }
    let energy = COULOMB_CONSTANT * charge_product / dist;
    (energy, -energy / dist)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn numeric_derivative(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn harmonic_is_zero_at_rest_length() {
        assert_eq!(harmonic(1.5, 1.5, 10.0), (0.0, 0.0));
    }

    #[test]
    fn harmonic_energy_and_derivative_for_stretched_spring() {
        let (energy, de_dr) = harmonic(2.0, 1.5, 1.0);
        assert!(f64_approx_equal(energy, 0.125));
        assert!(f64_approx_equal(de_dr, 0.5));
    }

    #[test]
    fn lennard_jones_minimum_is_at_two_to_the_sixth_sigma() {
        let r_min = 2f64.powf(1.0 / 6.0) * 0.5;
        let (energy, de_dr) = lennard_jones_12_6(r_min, 0.5, 5.0);
        assert!(f64_approx_equal(energy, -5.0));
        assert!(de_dr.abs() < 1e-9);
    }

    #[test]
    fn lennard_jones_is_zero_at_sigma() {
        let (energy, _) = lennard_jones_12_6(0.5, 0.5, 5.0);
        assert!(f64_approx_equal(energy, 0.0));
    }

    #[test]
    fn lennard_jones_derivative_matches_finite_difference() {
        let (_, de_dr) = lennard_jones_12_6(0.7, 0.5, 5.0);
        let numeric = numeric_derivative(|r| lennard_jones_12_6(r, 0.5, 5.0).0, 0.7);
        assert!((de_dr - numeric).abs() < 1e-5);
    }

    #[test]
    fn coulomb_repels_like_charges_and_attracts_opposite_ones() {
        let (repulsive, de_dr) = coulomb(1.0, 1.0);
        assert!(f64_approx_equal(repulsive, COULOMB_CONSTANT));
        assert!(de_dr < 0.0);

        let (attractive, _) = coulomb(2.0, -1.0);
        assert!(f64_approx_equal(attractive, -COULOMB_CONSTANT / 2.0));
    }

    #[test]
    fn coulomb_derivative_matches_finite_difference() {
        let (_, de_dr) = coulomb(0.8, -0.04);
        let numeric = numeric_derivative(|r| coulomb(r, -0.04).0, 0.8);
        assert!((de_dr - numeric).abs() < 1e-5);
    }

    #[test]
    fn zero_parameters_short_circuit_to_zero() {
        assert_eq!(lennard_jones_12_6(0.3, 0.5, 0.0), (0.0, 0.0));
        assert_eq!(coulomb(0.3, 0.0), (0.0, 0.0));
    }
}
