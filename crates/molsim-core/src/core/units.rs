/// Molar Boltzmann constant in kJ/(mol·K).
pub const BOLTZMANN: f64 = 0.008_314_462_618;

/// Coulomb's constant `1/(4πε0)` in kJ·nm/(mol·e²).
pub const COULOMB_CONSTANT: f64 = 138.935_456;
