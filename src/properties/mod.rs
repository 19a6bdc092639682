//! Physical properties of paths.

use std::fmt::Debug;
use std::hash::Hash;

mod pathkeys;
pub use pathkeys::*;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether self satisfies the required `other`.
    fn satisfies(&self, other: &Self) -> bool;
}
