use super::constraint::{Constraint, constraint_clusters};
use super::periodic_box::PeriodicBox;
use crate::core::forcefield::contributor::{ForceContributor, ForceGroup};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifies which kind of collection an out-of-range index referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Particle,
    Constraint,
    Force,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndexKind::Particle => "Particle",
            IndexKind::Constraint => "Constraint",
            IndexKind::Force => "Force",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SystemError {
    #[error("{kind} index {index} is out of range (count: {count})")]
    InvalidIndex {
        kind: IndexKind,
        index: usize,
        count: usize,
    },
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// A force contributor registered with a system, together with its force-group tag.
#[derive(Debug, Clone)]
pub struct RegisteredForce {
    contributor: Arc<dyn ForceContributor>,
    group: ForceGroup,
}

impl RegisteredForce {
    /// The contributor that evaluates this force.
    pub fn contributor(&self) -> &dyn ForceContributor {
        self.contributor.as_ref()
    }

    /// The force group this contributor is tagged with.
    pub fn group(&self) -> ForceGroup {
        self.group
    }
}

/// Static description of a particle system: masses, distance constraints and the force
/// contributors acting on it.
///
/// Particles are addressed by the dense index returned from [`ParticleSystem::add_particle`].
/// A mass of zero marks a fixed particle: it is never moved by the integrator and does not
/// contribute to the kinetic energy.
///
/// Force contributors are held behind `Arc`, so cloning a system is cheap and clones share
/// the (immutable) contributor objects.
#[derive(Debug, Clone, Default)]
pub struct ParticleSystem {
    /// Particle masses in atomic mass units.
    masses: Vec<f64>,
    /// Distance constraints as an edge list over particle indices.
    constraints: Vec<Constraint>,
    /// Registered force contributors in evaluation order.
    forces: Vec<RegisteredForce>,
    /// Box vectors a new context starts from, if the system is periodic.
    default_periodic_box: Option<PeriodicBox>,
}

impl ParticleSystem {
    /// Creates a new, empty particle system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a particle and returns its index.
    ///
    /// # Arguments
    ///
    /// * `mass` - Mass in amu. Zero denotes a fixed, massless particle.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidParameter`] if the mass is negative or not finite.
    pub fn add_particle(&mut self, mass: f64) -> Result<usize, SystemError> {
        check_mass(mass)?;
        self.masses.push(mass);
        Ok(self.masses.len() - 1)
    }

    /// Returns the number of particles in the system.
    pub fn num_particles(&self) -> usize {
        self.masses.len()
    }

    /// Returns the mass of a particle.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if `index` is out of range.
    pub fn particle_mass(&self, index: usize) -> Result<f64, SystemError> {
        self.check_particle(index)?;
        Ok(self.masses[index])
    }

    /// Changes the mass of a particle.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] for a bad index and
    /// [`SystemError::InvalidParameter`] for a negative or non-finite mass.
    pub fn set_particle_mass(&mut self, index: usize, mass: f64) -> Result<(), SystemError> {
        self.check_particle(index)?;
        check_mass(mass)?;
        self.masses[index] = mass;
        Ok(())
    }

    /// Returns all particle masses, indexed by particle.
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Returns the inverse masses, with zero for massless particles.
    pub fn inverse_masses(&self) -> Vec<f64> {
        self.masses
            .iter()
            .map(|&m| if m == 0.0 { 0.0 } else { 1.0 / m })
            .collect()
    }

    /// Adds a distance constraint between two particles and returns its index.
    ///
    /// # Arguments
    ///
    /// * `particle_a`, `particle_b` - Indices of two distinct particles.
    /// * `distance` - Target distance in nm; must be strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if either particle does not exist, and
    /// [`SystemError::InvalidParameter`] for a self-constraint or a non-positive distance.
    pub fn add_constraint(
        &mut self,
        particle_a: usize,
        particle_b: usize,
        distance: f64,
    ) -> Result<usize, SystemError> {
        let constraint = self.make_constraint(particle_a, particle_b, distance)?;
        self.constraints.push(constraint);
        Ok(self.constraints.len() - 1)
    }

    /// Returns the parameters `(particle_a, particle_b, distance)` of a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if `index` is out of range.
    pub fn constraint_parameters(&self, index: usize) -> Result<(usize, usize, f64), SystemError> {
        let c = self
            .constraints
            .get(index)
            .ok_or(SystemError::InvalidIndex {
                kind: IndexKind::Constraint,
                index,
                count: self.constraints.len(),
            })?;
        Ok((c.particle_a, c.particle_b, c.distance))
    }

    /// Replaces the parameters of an existing constraint.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ParticleSystem::add_constraint`], plus
    /// [`SystemError::InvalidIndex`] if the constraint does not exist.
    pub fn set_constraint_parameters(
        &mut self,
        index: usize,
        particle_a: usize,
        particle_b: usize,
        distance: f64,
    ) -> Result<(), SystemError> {
        self.check_constraint(index)?;
        self.constraints[index] = self.make_constraint(particle_a, particle_b, distance)?;
        Ok(())
    }

    /// Removes a constraint. Constraints after it shift down by one index.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if the constraint does not exist.
    pub fn remove_constraint(&mut self, index: usize) -> Result<Constraint, SystemError> {
        self.check_constraint(index)?;
        Ok(self.constraints.remove(index))
    }

    /// Returns the number of constraints.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Returns all constraints in insertion order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Groups constrained particles into clusters connected by constraints.
    pub fn constraint_clusters(&self) -> Vec<Vec<usize>> {
        constraint_clusters(self.masses.len(), &self.constraints)
    }

    /// Registers a force contributor in force group 0 and returns its index.
    pub fn add_force<F>(&mut self, force: F) -> usize
    where
        F: ForceContributor + 'static,
    {
        self.add_shared_force(Arc::new(force))
    }

    /// Registers an already shared force contributor in force group 0.
    pub fn add_shared_force(&mut self, force: Arc<dyn ForceContributor>) -> usize {
        self.forces.push(RegisteredForce {
            contributor: force,
            group: ForceGroup::default(),
        });
        self.forces.len() - 1
    }

    /// Returns the number of registered force contributors.
    pub fn num_forces(&self) -> usize {
        self.forces.len()
    }

    /// Returns the registered force contributors in evaluation order.
    pub fn forces(&self) -> &[RegisteredForce] {
        &self.forces
    }

    /// Returns the force contributor at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if the force does not exist.
    pub fn force(&self, index: usize) -> Result<&dyn ForceContributor, SystemError> {
        self.check_force(index)?;
        Ok(self.forces[index].contributor())
    }

    /// Returns the force group of a registered force contributor.
    pub fn force_group(&self, index: usize) -> Result<ForceGroup, SystemError> {
        self.check_force(index)?;
        Ok(self.forces[index].group)
    }

    /// Moves a registered force contributor to another force group.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidIndex`] if the force does not exist.
    pub fn set_force_group(&mut self, index: usize, group: ForceGroup) -> Result<(), SystemError> {
        self.check_force(index)?;
        self.forces[index].group = group;
        Ok(())
    }

    /// Returns the periodic box a new context starts from, if any.
    pub fn default_periodic_box(&self) -> Option<&PeriodicBox> {
        self.default_periodic_box.as_ref()
    }

    /// Sets or clears the periodic box a new context starts from.
    pub fn set_default_periodic_box(&mut self, periodic_box: Option<PeriodicBox>) {
        self.default_periodic_box = periodic_box;
    }

    /// Returns `true` if any registered force needs periodic box vectors.
    pub fn uses_periodic_boundary_conditions(&self) -> bool {
        self.forces
            .iter()
            .any(|f| f.contributor.uses_periodic_boundary_conditions())
    }

    fn make_constraint(
        &self,
        particle_a: usize,
        particle_b: usize,
        distance: f64,
    ) -> Result<Constraint, SystemError> {
        self.check_particle(particle_a)?;
        self.check_particle(particle_b)?;
        if particle_a == particle_b {
            return Err(SystemError::InvalidParameter {
                name: "constraint",
                reason: format!("particle {particle_a} cannot be constrained to itself"),
            });
        }
        if !(distance.is_finite() && distance > 0.0) {
            return Err(SystemError::InvalidParameter {
                name: "distance",
                reason: format!("constraint distance must be positive, got {distance}"),
            });
        }
        Ok(Constraint {
            particle_a,
            particle_b,
            distance,
        })
    }

    fn check_particle(&self, index: usize) -> Result<(), SystemError> {
        check_index(IndexKind::Particle, index, self.masses.len())
    }

    fn check_constraint(&self, index: usize) -> Result<(), SystemError> {
        check_index(IndexKind::Constraint, index, self.constraints.len())
    }

    fn check_force(&self, index: usize) -> Result<(), SystemError> {
        check_index(IndexKind::Force, index, self.forces.len())
    }
}

fn check_index(kind: IndexKind, index: usize, count: usize) -> Result<(), SystemError> {
    if index < count {
        Ok(())
    } else {
        Err(SystemError::InvalidIndex { kind, index, count })
    }
}

fn check_mass(mass: f64) -> Result<(), SystemError> {
    if mass.is_finite() && mass >= 0.0 {
        Ok(())
    } else {
        Err(SystemError::InvalidParameter {
            name: "mass",
            reason: format!("mass must be finite and non-negative, got {mass}"),
        })
    }
}
