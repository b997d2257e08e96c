//! Association paths and field references.

pub mod assoc;
pub mod field;

pub use assoc::{AssocStep, AssociationPath};
pub use field::{FieldRef, Template};
