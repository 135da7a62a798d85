use super::contributor::{ForceContributor, ForceError, check_particle};
use super::potentials;
use crate::core::models::periodic_box::PeriodicBox;
use itertools::Itertools;
use nalgebra::{Point3, Vector3};
use std::collections::{HashMap, HashSet};

const NAME: &str = "NonbondedForce";

/// How pair interactions are truncated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NonbondedMethod {
    /// Every pair interacts, no periodic images.
    NoCutoff,
    /// Pairs beyond `cutoff` nm are ignored, no periodic images.
    CutoffNonPeriodic { cutoff: f64 },
    /// Pairs beyond `cutoff` nm are ignored, distances use the minimum image.
    CutoffPeriodic { cutoff: f64 },
}

/// Per-particle nonbonded parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonbondedParticle {
    /// Charge in e.
    pub charge: f64,
    /// Lennard-Jones σ in nm.
    pub sigma: f64,
    /// Lennard-Jones ε in kJ/mol.
    pub epsilon: f64,
}

/// A pair whose interaction replaces the default combination rule.
///
/// A zero charge product and zero ε turn the exception into a full exclusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonbondedException {
    pub particle_a: usize,
    pub particle_b: usize,
    pub charge_product: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

/// Coulomb plus Lennard-Jones interactions between all particle pairs.
///
/// Lennard-Jones parameters combine with the Lorentz–Berthelot rules
/// (`σ = (σa+σb)/2`, `ε = √(εa·εb)`). Cutoff methods truncate both terms at the cutoff
/// without a switching function. Exceptions are always evaluated regardless of cutoff.
#[derive(Debug, Clone)]
pub struct NonbondedForce {
    particles: Vec<NonbondedParticle>,
    exceptions: Vec<NonbondedException>,
    exception_index: HashMap<(usize, usize), usize>,
    method: NonbondedMethod,
}

impl Default for NonbondedForce {
    fn default() -> Self {
        Self {
            particles: Vec::new(),
            exceptions: Vec::new(),
            exception_index: HashMap::new(),
            method: NonbondedMethod::NoCutoff,
        }
    }
}

impl NonbondedForce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(&self) -> NonbondedMethod {
        self.method
    }

    pub fn set_method(&mut self, method: NonbondedMethod) {
        self.method = method;
    }

    /// Adds parameters for the next particle and returns its index. Must be called once
    /// per system particle, in order.
    pub fn add_particle(&mut self, charge: f64, sigma: f64, epsilon: f64) -> usize {
        self.particles.push(NonbondedParticle {
            charge,
            sigma,
            epsilon,
        });
        self.particles.len() - 1
    }

    pub fn particles(&self) -> &[NonbondedParticle] {
        &self.particles
    }

    pub fn exceptions(&self) -> &[NonbondedException] {
        &self.exceptions
    }

    /// Adds or replaces the exception for a pair and returns its index.
    pub fn add_exception(
        &mut self,
        particle_a: usize,
        particle_b: usize,
        charge_product: f64,
        sigma: f64,
        epsilon: f64,
    ) -> usize {
        let exception = NonbondedException {
            particle_a,
            particle_b,
            charge_product,
            sigma,
            epsilon,
        };
        let key = pair_key(particle_a, particle_b);
        if let Some(&index) = self.exception_index.get(&key) {
            self.exceptions[index] = exception;
            index
        } else {
            self.exceptions.push(exception);
            let index = self.exceptions.len() - 1;
            self.exception_index.insert(key, index);
            index
        }
    }

    /// Excludes a pair from interacting at all.
    pub fn add_exclusion(&mut self, particle_a: usize, particle_b: usize) -> usize {
        self.add_exception(particle_a, particle_b, 0.0, 1.0, 0.0)
    }

    /// Derives exceptions from a bond graph.
    ///
    /// Pairs separated by one or two bonds are excluded. Pairs separated by exactly three
    /// bonds keep their interaction with the Coulomb term scaled by `coulomb_14_scale` and
    /// the Lennard-Jones ε scaled by `lj_14_scale`.
    ///
    /// # Errors
    ///
    /// Returns [`ForceError::ParticleOutOfRange`] if a bond refers to a particle without
    /// nonbonded parameters.
    pub fn create_exceptions_from_bonds(
        &mut self,
        bonds: &[(usize, usize)],
        coulomb_14_scale: f64,
        lj_14_scale: f64,
    ) -> Result<(), ForceError> {
        let count = self.particles.len();
        let mut neighbors: Vec<HashSet<usize>> = vec![HashSet::new(); count];
        for &(a, b) in bonds {
            check_particle(NAME, a, count)?;
            check_particle(NAME, b, count)?;
            neighbors[a].insert(b);
            neighbors[b].insert(a);
        }

        for start in 0..count {
            let mut seen: HashSet<usize> = HashSet::from([start]);
            let mut frontier = vec![start];
            for hops in 1..=3 {
                let mut next = Vec::new();
                for &p in &frontier {
                    for n in neighbors[p].iter().copied().sorted_unstable() {
                        if seen.insert(n) {
                            next.push(n);
                        }
                    }
                }
                for &other in &next {
                    if other <= start {
                        continue;
                    }
                    if hops < 3 {
                        self.add_exclusion(start, other);
                    } else {
                        let pa = self.particles[start];
                        let pb = self.particles[other];
                        self.add_exception(
                            start,
                            other,
                            coulomb_14_scale * pa.charge * pb.charge,
                            0.5 * (pa.sigma + pb.sigma),
                            lj_14_scale * (pa.epsilon * pb.epsilon).sqrt(),
                        );
                    }
                }
                frontier = next;
            }
        }
        Ok(())
    }

    fn cutoff(&self) -> Option<f64> {
        match self.method {
            NonbondedMethod::NoCutoff => None,
            NonbondedMethod::CutoffNonPeriodic { cutoff }
            | NonbondedMethod::CutoffPeriodic { cutoff } => Some(cutoff),
        }
    }
}

#[inline]
fn pair_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

/// Adds the pair force for `delta = pos[b] - pos[a]` and returns the pair energy.
#[inline]
fn apply_pair(
    forces: &mut [Vector3<f64>],
    a: usize,
    b: usize,
    delta: Vector3<f64>,
    charge_product: f64,
    sigma: f64,
    epsilon: f64,
) -> f64 {
    let dist = delta.norm();
    let (e_lj, de_lj) = potentials::lennard_jones_12_6(dist, sigma, epsilon);
    let (e_coul, de_coul) = potentials::coulomb(dist, charge_product);
    let f = delta * ((de_lj + de_coul) / dist);
    forces[a] += f;
    forces[b] -= f;
    e_lj + e_coul
}

impl ForceContributor for NonbondedForce {
    fn name(&self) -> &'static str {
        NAME
    }

    fn uses_periodic_boundary_conditions(&self) -> bool {
        matches!(self.method, NonbondedMethod::CutoffPeriodic { .. })
    }

    fn validate(&self, num_particles: usize) -> Result<(), ForceError> {
        if self.particles.len() != num_particles {
            return Err(ForceError::ParticleCountMismatch {
                force: NAME,
                defined: self.particles.len(),
                count: num_particles,
            });
        }
        for ex in &self.exceptions {
            check_particle(NAME, ex.particle_a, num_particles)?;
            check_particle(NAME, ex.particle_b, num_particles)?;
        }
        if let Some(cutoff) = self.cutoff() {
            if !(cutoff.is_finite() && cutoff > 0.0) {
                return Err(ForceError::InvalidParameter {
                    force: NAME,
                    reason: format!("cutoff must be positive, got {cutoff}"),
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
        let pbox = match self.method {
            NonbondedMethod::CutoffPeriodic { cutoff } => {
                let b = periodic_box.ok_or(ForceError::MissingPeriodicBox { force: NAME })?;
                let limit = 0.5 * b.min_face_distance();
                if cutoff > limit {
                    return Err(ForceError::CutoffTooLarge {
                        force: NAME,
                        cutoff,
                        limit,
                    });
                }
                Some(b)
            }
            _ => None,
        };
        let cutoff_sq = self.cutoff().map(|c| c * c);
        let displacement = |a: usize, b: usize| {
            let delta = positions[b] - positions[a];
            match pbox {
                Some(pb) => pb.minimum_image(delta),
                None => delta,
            }
        };

        let mut energy = 0.0;
        for (a, b) in (0..self.particles.len()).tuple_combinations() {
            if self.exception_index.contains_key(&(a, b)) {
                continue;
            }
            let delta = displacement(a, b);
            if let Some(limit) = cutoff_sq {
                if delta.norm_squared() > limit {
                    continue;
                }
            }
            let (pa, pb) = (self.particles[a], self.particles[b]);
            energy += apply_pair(
                forces,
                a,
                b,
                delta,
                pa.charge * pb.charge,
                0.5 * (pa.sigma + pb.sigma),
                (pa.epsilon * pb.epsilon).sqrt(),
            );
        }

        for ex in &self.exceptions {
            if ex.charge_product == 0.0 && ex.epsilon == 0.0 {
                continue;
            }
            let delta = displacement(ex.particle_a, ex.particle_b);
            energy += apply_pair(
                forces,
                ex.particle_a,
                ex.particle_b,
                delta,
                ex.charge_product,
                ex.sigma,
                ex.epsilon,
            );
        }
        Ok(energy)
    }
}
