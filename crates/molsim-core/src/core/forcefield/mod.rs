//! # Force Field Module
//!
//! This module defines how forces enter a simulation. The engine never looks inside a
//! force contributor: it only asks each registered [`contributor::ForceContributor`] to
//! add its forces into a buffer and report its share of the potential energy.
//!
//! ## Overview
//!
//! - **The contributor contract** - validation against the particle count and force/energy
//!   accumulation for a set of coordinates
//! - **Force groups** - a tag in `0..32` per registered contributor, and a bit mask that
//!   lets an integrator or a state query select a subset of groups
//! - **Concrete contributors** - harmonic bonds, Coulomb plus Lennard-Jones nonbonded
//!   interactions, and uniform external fields
//!
//! ## Key Components
//!
//! - [`contributor`] - `ForceContributor`, `ForceGroup`, `ForceGroupMask`, `ForceError`
//! - [`potentials`] - Pure pair-potential functions returning energy and `dE/dr`
//! - [`bonded`] - `HarmonicBondForce`
//! - [`nonbonded`] - `NonbondedForce` with exceptions and cutoff methods
//! - [`external`] - `ExternalFieldForce`
//!
//! ## Usage
//!
//! ```ignore
//! use molsim::core::forcefield::bonded::HarmonicBondForce;
//!
//! let mut bonds = HarmonicBondForce::new();
//! bonds.add_bond(0, 1, 0.15, 2.5e5);
//! let index = system.add_force(bonds);
//! ```

pub mod bonded;
pub mod contributor;
pub mod external;
pub mod nonbonded;
pub(crate) mod potentials;
