//! Value types bound as query parameters.

mod term;

pub use term::Term;
