use crate::core::models::periodic_box::PeriodicBox;
use nalgebra::{Point3, Vector3};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForceError {
    #[error("{force} references particle {index}, but the system has {count} particles")]
    ParticleOutOfRange {
        force: &'static str,
        index: usize,
        count: usize,
    },
    #[error("{force} defines parameters for {defined} particles, but the system has {count}")]
    ParticleCountMismatch {
        force: &'static str,
        defined: usize,
        count: usize,
    },
    #[error("{force} requires periodic box vectors")]
    MissingPeriodicBox { force: &'static str },
    #[error("{force}: cutoff {cutoff} nm exceeds half the smallest box width ({limit} nm)")]
    CutoffTooLarge {
        force: &'static str,
        cutoff: f64,
        limit: f64,
    },
    #[error("{force}: invalid parameter: {reason}")]
    InvalidParameter { force: &'static str, reason: String },
    #[error("{force} produced a non-finite force or energy")]
    NonFinite { force: &'static str },
}

/// A source of forces and potential energy.
///
/// Implementors add their force on every particle into the supplied buffer and return
/// their potential energy. Evaluation must be a pure function of the coordinates, so that
/// repeated evaluation of identical inputs gives bit-identical results.
pub trait ForceContributor: fmt::Debug + Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether evaluation depends on the periodic box vectors.
    fn uses_periodic_boundary_conditions(&self) -> bool {
        false
    }

    /// Checks that every parameter refers to a particle of a system with
    /// `num_particles` particles.
    fn validate(&self, num_particles: usize) -> Result<(), ForceError>;

    /// Adds this contributor's forces (kJ/mol/nm) into `forces` and returns its potential
    /// energy (kJ/mol).
    fn accumulate(
        &self,
        positions: &[Point3<f64>],
        periodic_box: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError>;
}

/// A force-group tag in `0..32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ForceGroup(u8);

impl ForceGroup {
    pub const MAX: u8 = 31;

    /// Creates a group tag, or `None` if `index > 31`.
    pub fn new(index: u8) -> Option<Self> {
        (index <= Self::MAX).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// A set of force groups, one bit per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForceGroupMask(u32);

impl ForceGroupMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn only(group: ForceGroup) -> Self {
        Self(1 << group.0)
    }

    /// Builds a mask from a list of group indices, or `None` if any index is above 31.
    pub fn from_groups(groups: &[u8]) -> Option<Self> {
        groups.iter().try_fold(Self::NONE, |mask, &g| {
            ForceGroup::new(g).map(|group| mask | Self::only(group))
        })
    }

    #[inline]
    pub fn contains(self, group: ForceGroup) -> bool {
        self.0 & (1 << group.0) != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for ForceGroupMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ForceGroupMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ForceGroupMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Validates a particle index held by a contributor.
pub(crate) fn check_particle(
    force: &'static str,
    index: usize,
    count: usize,
) -> Result<(), ForceError> {
    if index < count {
        Ok(())
    } else {
        Err(ForceError::ParticleOutOfRange {
            force,
            index,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_group_rejects_indices_above_31() {
        assert_eq!(ForceGroup::new(31).map(ForceGroup::index), Some(31));
        assert!(ForceGroup::new(32).is_none());
        assert_eq!(ForceGroup::default().index(), 0);
    }

    #[test]
    fn mask_contains_only_selected_groups() {
        let one = ForceGroup::new(1).unwrap();
        let two = ForceGroup::new(2).unwrap();
        let mask = ForceGroupMask::only(one);
        assert!(mask.contains(one));
        assert!(!mask.contains(two));
        assert_eq!(mask.bits(), 1 << 1);
        assert!((mask | ForceGroupMask::only(two)).contains(two));
    }

    #[test]
    fn mask_from_groups_builds_union_and_rejects_bad_indices() {
        let mask = ForceGroupMask::from_groups(&[0, 3, 31]).unwrap();
        assert_eq!(mask.bits(), 1 | (1 << 3) | (1 << 31));
        assert!(ForceGroupMask::from_groups(&[40]).is_none());
        assert_eq!(ForceGroupMask::from_groups(&[]), Some(ForceGroupMask::NONE));
    }

    #[test]
    fn default_mask_selects_every_group() {
        let mask = ForceGroupMask::default();
        assert!((0..=ForceGroup::MAX).all(|g| mask.contains(ForceGroup::new(g).unwrap())));
    }

    #[test]
    fn check_particle_reports_out_of_range_indices() {
        assert!(check_particle("Test", 2, 3).is_ok());
        assert_eq!(
            check_particle("Test", 3, 3),
            Err(ForceError::ParticleOutOfRange {
                force: "Test",
                index: 3,
                count: 3
            })
        );
    }
}
