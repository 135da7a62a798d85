use super::error::EngineError;
use crate::core::models::system::ParticleSystem;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::ops::{AddAssign, SubAssign};
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Relative geometry below which a SHAKE correction is considered ill-conditioned.
const DEGENERACY_THRESHOLD: f64 = 1e-6;

/// How a relaxation sweep applies the per-constraint corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepOrder {
    /// Gauss–Seidel: each correction is applied as soon as it is computed, so later
    /// constraints in the sweep see the updated coordinates.
    #[default]
    Sequential,
    /// Jacobi: all corrections of a sweep are computed from the same coordinates,
    /// accumulated per particle, and applied at the end averaged over the number of
    /// constraints touching each particle.
    Simultaneous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintSettings {
    /// Relative tolerance on constraint distances.
    pub tolerance: f64,
    /// Maximum number of full sweeps before giving up.
    pub max_iterations: usize,
    pub sweep: SweepOrder,
}

impl Default for ConstraintSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 250,
            sweep: SweepOrder::Sequential,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveConstraint {
    a: usize,
    b: usize,
    distance_sq: f64,
    weight_a: f64,
    weight_b: f64,
}

impl ActiveConstraint {
    #[inline]
    fn total_weight(&self) -> f64 {
        self.weight_a + self.weight_b
    }

    #[inline]
    fn relative_error(&self, positions: &[Point3<f64>]) -> f64 {
        let p = positions[self.a] - positions[self.b];
        (self.distance_sq - p.norm_squared()).abs() / (2.0 * self.distance_sq)
    }
}

/// Result of examining one constraint during a sweep.
enum Projection {
    Satisfied,
    /// Unweighted correction `d`: endpoint `a` moves by `d·w_a`, `b` by `−d·w_b`.
    Correct(Vector3<f64>),
    Degenerate,
}

/// Iterative SHAKE/RATTLE projection onto a system's distance constraints.
///
/// The solver is built once per system. It validates that no constraint cluster mixes
/// massless and massive particles, drops constraints between two massless particles (they
/// never move), and caches inverse-mass weights for the remaining active constraints.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    constraints: Vec<ActiveConstraint>,
    inverse_masses: Vec<f64>,
    /// Number of active constraints touching each particle.
    multiplicity: Vec<u32>,
}

impl ConstraintSolver {
    /// Builds a solver for the constraints of `system`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfiguration`] if any connected cluster of
    /// constraints contains both massless and massive particles.
    pub fn new(system: &ParticleSystem) -> Result<Self, EngineError> {
        let masses = system.masses();
        for cluster in system.constraint_clusters() {
            let massless = cluster.iter().filter(|&&p| masses[p] == 0.0).count();
            if massless > 0 && massless < cluster.len() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "constraint cluster {cluster:?} mixes massless and massive particles"
                )));
            }
        }

        let inverse_masses = system.inverse_masses();
        let mut multiplicity = vec![0u32; masses.len()];
        let constraints: Vec<ActiveConstraint> = system
            .constraints()
            .iter()
            .filter(|c| masses[c.particle_a] != 0.0)
            .map(|c| {
                multiplicity[c.particle_a] += 1;
                multiplicity[c.particle_b] += 1;
                ActiveConstraint {
                    a: c.particle_a,
                    b: c.particle_b,
                    distance_sq: c.distance * c.distance,
                    weight_a: inverse_masses[c.particle_a],
                    weight_b: inverse_masses[c.particle_b],
                }
            })
            .collect();

        Ok(Self {
            constraints,
            inverse_masses,
            multiplicity,
        })
    }

    /// Number of constraints the solver actually enforces.
    pub fn num_active(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn inverse_masses(&self) -> &[f64] {
        &self.inverse_masses
    }

    /// Largest relative squared-distance error `|d² − r²| / 2d²` over active constraints.
    pub fn max_relative_error(&self, positions: &[Point3<f64>]) -> f64 {
        self.constraints
            .iter()
            .map(|c| c.relative_error(positions))
            .fold(0.0, f64::max)
    }

    /// Projects `trial` positions onto the constraint manifold (SHAKE).
    ///
    /// Corrections are applied along the bond vectors of `reference`, normally the
    /// positions before the unconstrained update. Returns the number of sweeps used.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConstraintConvergence`] if the tolerance is not reached
    /// within `settings.max_iterations` sweeps, or if a trial bond has rotated so far from
    /// its reference that the correction is ill-conditioned.
    pub fn apply_to_positions(
        &self,
        reference: &[Point3<f64>],
        trial: &mut [Point3<f64>],
        settings: &ConstraintSettings,
    ) -> Result<usize, EngineError> {
        if self.is_empty() {
            return Ok(0);
        }
        let bond_vectors: Vec<Vector3<f64>> = self
            .constraints
            .iter()
            .map(|c| reference[c.a] - reference[c.b])
            .collect();
        let tolerance = settings.tolerance;

        let project = |k: usize, positions: &[Point3<f64>]| {
            let c = &self.constraints[k];
            let p = positions[c.a] - positions[c.b];
            let diff = c.distance_sq - p.norm_squared();
            if diff.abs() <= 2.0 * c.distance_sq * tolerance {
                return Projection::Satisfied;
            }
            let r = bond_vectors[k];
            let rp = r.dot(&p);
            if rp < c.distance_sq * DEGENERACY_THRESHOLD {
                return Projection::Degenerate;
            }
            Projection::Correct(r * (diff / (2.0 * c.total_weight() * rp)))
        };
        let residual = |positions: &[Point3<f64>]| self.max_relative_error(positions);

        self.relax(trial, settings, project, residual)
    }

    /// Removes the relative velocity along every active constraint (RATTLE).
    ///
    /// The velocity constraints are linear in the velocities, so the sweeps are
    /// conjugate-gradient steps on `J·W·Jᵀ·λ = −J·v`. Each sweep zeroes a per-particle
    /// increment, accumulates the inverse-mass-weighted bond direction of every constraint
    /// into it and adds it to the velocities with the conjugate step length. Strongly
    /// coupled clusters such as straight chains converge in at most about one sweep per
    /// constraint. A constraint is satisfied once its radial relative speed is within
    /// `tolerance` of the largest relative speed any constraint had before projection.
    /// The sweep order setting only applies to positions.
    ///
    /// Returns the number of sweeps used.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConstraintConvergence`] if a constrained pair sits at the same
    /// point, or if the tolerance is not reached within
    /// `max(settings.max_iterations, 2 × active constraints)` sweeps.
    pub fn apply_to_velocities(
        &self,
        positions: &[Point3<f64>],
        velocities: &mut [Vector3<f64>],
        settings: &ConstraintSettings,
    ) -> Result<usize, EngineError> {
        if self.is_empty() {
            return Ok(0);
        }
        let bonds: Vec<Vector3<f64>> = self
            .constraints
            .iter()
            .map(|c| positions[c.a] - positions[c.b])
            .collect();
        let lengths: Vec<f64> = bonds.iter().map(|r| r.norm()).collect();
        if lengths.iter().any(|&l| l == 0.0) {
            return Err(EngineError::ConstraintConvergence {
                iterations: 0,
                max_error: f64::INFINITY,
            });
        }

        let speed_scale = self
            .constraints
            .iter()
            .map(|c| (velocities[c.a] - velocities[c.b]).norm())
            .fold(0.0, f64::max);
        if speed_scale == 0.0 {
            return Ok(0);
        }
        let relative_error = |radial: &[f64]| {
            radial
                .iter()
                .zip(&lengths)
                .map(|(rv, l)| rv.abs() / (l * speed_scale))
                .fold(0.0, f64::max)
        };

        let mut radial = self.bond_projections(&bonds, velocities);
        let mut max_error = relative_error(&radial);
        if max_error <= settings.tolerance {
            return Ok(0);
        }

        let max_sweeps = settings.max_iterations.max(2 * self.num_active());
        let mut direction: Vec<f64> = radial.iter().map(|rv| -rv).collect();
        let mut residual_sq: f64 = radial.iter().map(|rv| rv * rv).sum();
        let mut increments: Vec<Vector3<f64>> = vec![Vector3::zeros(); velocities.len()];
        let mut sweeps = 0;
        while sweeps < max_sweeps {
            sweeps += 1;
            increments.fill(Vector3::zeros());
            for ((c, r), &p) in self.constraints.iter().zip(&bonds).zip(&direction) {
                increments[c.a] += *r * (p * c.weight_a);
                increments[c.b] -= *r * (p * c.weight_b);
            }
            let response = self.bond_projections(&bonds, &increments);
            let curvature: f64 = direction.iter().zip(&response).map(|(p, q)| p * q).sum();
            if curvature.is_nan() || curvature <= 0.0 {
                break;
            }

            let step = residual_sq / curvature;
            for (v, u) in velocities.iter_mut().zip(&increments) {
                *v += *u * step;
            }
            radial = self.bond_projections(&bonds, velocities);
            max_error = relative_error(&radial);
            if max_error <= settings.tolerance {
                trace!(iterations = sweeps, "Velocity constraints converged.");
                return Ok(sweeps);
            }

            let next_sq: f64 = radial.iter().map(|rv| rv * rv).sum();
            let beta = next_sq / residual_sq;
            for (p, rv) in direction.iter_mut().zip(&radial) {
                *p = -rv + beta * *p;
            }
            residual_sq = next_sq;
        }

        Err(EngineError::ConstraintConvergence {
            iterations: sweeps,
            max_error,
        })
    }

    /// `r_k · (values[a] − values[b])` for every active constraint, in constraint order.
    fn bond_projections(&self, bonds: &[Vector3<f64>], values: &[Vector3<f64>]) -> Vec<f64> {
        #[cfg(not(feature = "parallel"))]
        let iterator = self.constraints.iter().zip(bonds);

        #[cfg(feature = "parallel")]
        let iterator = self.constraints.par_iter().zip(bonds);

        iterator
            .map(|(c, r)| r.dot(&(values[c.a] - values[c.b])))
            .collect()
    }

    fn relax<T, P, R>(
        &self,
        values: &mut [T],
        settings: &ConstraintSettings,
        project: P,
        residual: R,
    ) -> Result<usize, EngineError>
    where
        T: Copy + Send + Sync + AddAssign<Vector3<f64>> + SubAssign<Vector3<f64>>,
        P: Fn(usize, &[T]) -> Projection + Sync,
        R: Fn(&[T]) -> f64,
    {
        for iteration in 1..=settings.max_iterations {
            let outcome = match settings.sweep {
                SweepOrder::Sequential => self.sequential_sweep(values, &project),
                SweepOrder::Simultaneous => self.simultaneous_sweep(values, &project),
            };
            match outcome {
                Some(true) => {
                    trace!(iterations = iteration, "Constraints converged.");
                    return Ok(iteration);
                }
                Some(false) => {}
                None => {
                    return Err(EngineError::ConstraintConvergence {
                        iterations: iteration,
                        max_error: residual(values),
                    });
                }
            }
        }

        let max_error = residual(values);
        if max_error <= settings.tolerance {
            Ok(settings.max_iterations)
        } else {
            Err(EngineError::ConstraintConvergence {
                iterations: settings.max_iterations,
                max_error,
            })
        }
    }

    /// Returns `Some(true)` when no constraint needed a correction, `None` on degeneracy.
    fn sequential_sweep<T, P>(&self, values: &mut [T], project: &P) -> Option<bool>
    where
        T: Copy + AddAssign<Vector3<f64>> + SubAssign<Vector3<f64>>,
        P: Fn(usize, &[T]) -> Projection,
    {
        let mut converged = true;
        for (k, c) in self.constraints.iter().enumerate() {
            match project(k, values) {
                Projection::Satisfied => {}
                Projection::Correct(d) => {
                    converged = false;
                    values[c.a] += d * c.weight_a;
                    values[c.b] -= d * c.weight_b;
                }
                Projection::Degenerate => return None,
            }
        }
        Some(converged)
    }

    fn simultaneous_sweep<T, P>(&self, values: &mut [T], project: &P) -> Option<bool>
    where
        T: Copy + Send + Sync + AddAssign<Vector3<f64>> + SubAssign<Vector3<f64>>,
        P: Fn(usize, &[T]) -> Projection + Sync,
    {
        let projections: Vec<Projection> = {
            let current: &[T] = values;

            #[cfg(not(feature = "parallel"))]
            let iterator = 0..self.constraints.len();

            #[cfg(feature = "parallel")]
            let iterator = (0..self.constraints.len()).into_par_iter();

            iterator.map(|k| project(k, current)).collect()
        };

        let mut increments: Vec<Vector3<f64>> = vec![Vector3::zeros(); values.len()];
        let mut converged = true;
        for (c, projection) in self.constraints.iter().zip(&projections) {
            match *projection {
                Projection::Satisfied => {}
                Projection::Correct(d) => {
                    converged = false;
                    increments[c.a] += d * c.weight_a;
                    increments[c.b] -= d * c.weight_b;
                }
                Projection::Degenerate => return None,
            }
        }
        if !converged {
            for (i, increment) in increments.into_iter().enumerate() {
                if self.multiplicity[i] > 0 {
                    values[i] += increment / f64::from(self.multiplicity[i]);
                }
            }
        }
        Some(converged)
    }
}
