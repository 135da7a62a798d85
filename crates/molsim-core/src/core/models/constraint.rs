/// A holonomic distance constraint between two particles.
///
/// The constraint removes the bond-stretching degree of freedom between `particle_a` and
/// `particle_b` from the dynamics: the integrator projects positions and velocities so
/// that the pair stays `distance` apart instead of applying a restoring force.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    /// Index of the first particle.
    pub particle_a: usize,
    /// Index of the second particle.
    pub particle_b: usize,
    /// Target distance in nanometers. Always strictly positive.
    pub distance: f64,
}

impl Constraint {
    /// Returns `true` if the constraint touches the given particle.
    #[inline]
    pub fn involves(&self, particle: usize) -> bool {
        self.particle_a == particle || self.particle_b == particle
    }
}

/// Groups particles into clusters that are connected through constraints.
///
/// Two particles belong to the same cluster when a chain of constraints links them,
/// however many hops long. Particles without any constraint are not reported.
/// Clusters are returned with their particle indices sorted ascending, and the clusters
/// themselves ordered by their smallest member.
///
/// # Arguments
///
/// * `num_particles` - Number of particles in the system.
/// * `constraints` - The constraint edge list. Every index must be `< num_particles`.
///
/// # Return
///
/// A list of clusters, each with at least two particles.
pub fn constraint_clusters(num_particles: usize, constraints: &[Constraint]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..num_particles).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for c in constraints {
        let ra = find(&mut parent, c.particle_a);
        let rb = find(&mut parent, c.particle_b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            parent[hi] = lo;
        }
    }

    let mut constrained = vec![false; num_particles];
    for c in constraints {
        constrained[c.particle_a] = true;
        constrained[c.particle_b] = true;
    }

    let mut slot_of_root: Vec<Option<usize>> = vec![None; num_particles];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for particle in 0..num_particles {
        if !constrained[particle] {
            continue;
        }
        let root = find(&mut parent, particle);
        match slot_of_root[root] {
            Some(slot) => clusters[slot].push(particle),
            None => {
                slot_of_root[root] = Some(clusters.len());
                clusters.push(vec![particle]);
            }
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(a: usize, b: usize) -> Constraint {
        Constraint {
            particle_a: a,
            particle_b: b,
            distance: 1.0,
        }
    }

    #[test]
    fn involves_matches_either_endpoint() {
        let constraint = c(2, 5);
        assert!(constraint.involves(2));
        assert!(constraint.involves(5));
        assert!(!constraint.involves(3));
    }

    #[test]
    fn unconstrained_particles_form_no_clusters() {
        assert!(constraint_clusters(4, &[]).is_empty());
    }

    #[test]
    fn independent_pairs_form_separate_clusters() {
        let clusters = constraint_clusters(6, &[c(0, 1), c(4, 5)]);
        assert_eq!(clusters, vec![vec![0, 1], vec![4, 5]]);
    }

    #[test]
    fn multi_hop_chains_are_merged_into_one_cluster() {
        let clusters = constraint_clusters(8, &[c(6, 7), c(0, 1), c(1, 2), c(2, 3), c(3, 6)]);
        assert_eq!(clusters, vec![vec![0, 1, 2, 3, 6, 7]]);
    }

    #[test]
    fn star_and_ring_topologies_are_single_clusters() {
        let clusters = constraint_clusters(
            7,
            &[c(0, 1), c(0, 2), c(0, 3), c(0, 4), c(1, 5), c(1, 6), c(2, 3), c(5, 6)],
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
