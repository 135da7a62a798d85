use super::periodic_box::PeriodicBox;
use nalgebra::{Point3, Vector3};
use std::ops::{BitOr, BitOrAssign};

/// Borrowed view of the geometric inputs a force evaluation depends on.
#[derive(Debug, Clone, Copy)]
pub struct Coordinates<'a> {
    /// Particle positions in nm.
    pub positions: &'a [Point3<f64>],
    /// Periodic box vectors, if the simulation is periodic.
    pub periodic_box: Option<&'a PeriodicBox>,
}

/// The live, mutable state of a simulation.
///
/// A `SimulationState` is exclusively owned by a simulation context. Its array lengths
/// always equal the particle count of the system the context was built over; every mutator
/// that could break this lives on the context and checks it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub(crate) positions: Vec<Point3<f64>>,
    pub(crate) velocities: Vec<Vector3<f64>>,
    pub(crate) time: f64,
    pub(crate) step_count: u64,
    pub(crate) periodic_box: Option<PeriodicBox>,
}

impl SimulationState {
    /// Creates a state with all particles at the origin, at rest, at time zero.
    pub fn new(num_particles: usize, periodic_box: Option<PeriodicBox>) -> Self {
        Self {
            positions: vec![Point3::origin(); num_particles],
            velocities: vec![Vector3::zeros(); num_particles],
            time: 0.0,
            step_count: 0,
            periodic_box,
        }
    }

    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.velocities
    }

    /// Elapsed simulated time in ps.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of integration steps committed so far.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn periodic_box(&self) -> Option<&PeriodicBox> {
        self.periodic_box.as_ref()
    }

    /// Borrows the positions and box as force-evaluation input.
    pub fn coordinates(&self) -> Coordinates<'_> {
        Coordinates {
            positions: &self.positions,
            periodic_box: self.periodic_box.as_ref(),
        }
    }
}

/// Bit mask selecting which fields a [`StateSnapshot`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataMask(u8);

impl DataMask {
    pub const NONE: Self = Self(0);
    pub const POSITIONS: Self = Self(1 << 0);
    pub const VELOCITIES: Self = Self(1 << 1);
    pub const FORCES: Self = Self(1 << 2);
    /// Potential and kinetic energy.
    pub const ENERGY: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for DataMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DataMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// An immutable, independently owned copy of selected simulation state.
///
/// Fields that were not requested through the [`DataMask`] are absent and their accessors
/// return `None`. The time and periodic box are always recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub(crate) mask: DataMask,
    pub(crate) time: f64,
    pub(crate) step_count: u64,
    pub(crate) periodic_box: Option<PeriodicBox>,
    pub(crate) positions: Option<Vec<Point3<f64>>>,
    pub(crate) velocities: Option<Vec<Vector3<f64>>>,
    pub(crate) forces: Option<Vec<Vector3<f64>>>,
    pub(crate) potential_energy: Option<f64>,
    pub(crate) kinetic_energy: Option<f64>,
}

impl StateSnapshot {
    /// The fields this snapshot was asked to carry.
    pub fn mask(&self) -> DataMask {
        self.mask
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn periodic_box(&self) -> Option<&PeriodicBox> {
        self.periodic_box.as_ref()
    }

    pub fn positions(&self) -> Option<&[Point3<f64>]> {
        self.positions.as_deref()
    }

    pub fn velocities(&self) -> Option<&[Vector3<f64>]> {
        self.velocities.as_deref()
    }

    pub fn forces(&self) -> Option<&[Vector3<f64>]> {
        self.forces.as_deref()
    }

    /// Potential energy in kJ/mol.
    pub fn potential_energy(&self) -> Option<f64> {
        self.potential_energy
    }

    /// Kinetic energy in kJ/mol.
    pub fn kinetic_energy(&self) -> Option<f64> {
        self.kinetic_energy
    }

    /// Sum of potential and kinetic energy, if energies were requested.
    pub fn total_energy(&self) -> Option<f64> {
        Some(self.potential_energy? + self.kinetic_energy?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_mask_combines_and_tests_bits() {
        let mask = DataMask::POSITIONS | DataMask::ENERGY;
        assert!(mask.contains(DataMask::POSITIONS));
        assert!(mask.contains(DataMask::ENERGY));
        assert!(!mask.contains(DataMask::VELOCITIES));
        assert!(!mask.contains(DataMask::POSITIONS | DataMask::FORCES));
        assert!(DataMask::ALL.contains(mask));
        assert!(DataMask::NONE.is_empty());
    }

    #[test]
    fn new_state_starts_at_rest_at_the_origin() {
        let state = SimulationState::new(3, None);
        assert_eq!(state.num_particles(), 3);
        assert!(state.positions().iter().all(|p| *p == Point3::origin()));
        assert!(state.velocities().iter().all(|v| *v == Vector3::zeros()));
        assert_eq!(state.time(), 0.0);
        assert_eq!(state.step_count(), 0);
        assert!(state.coordinates().periodic_box.is_none());
    }

    #[test]
    fn snapshot_total_energy_requires_both_terms() {
        let mut snapshot = StateSnapshot {
            mask: DataMask::ENERGY,
            time: 0.0,
            step_count: 0,
            periodic_box: None,
            positions: None,
            velocities: None,
            forces: None,
            potential_energy: Some(-3.0),
            kinetic_energy: Some(1.0),
        };
        assert_eq!(snapshot.total_energy(), Some(-2.0));
        snapshot.kinetic_energy = None;
        assert_eq!(snapshot.total_energy(), None);
        assert!(snapshot.positions().is_none());
    }
}
