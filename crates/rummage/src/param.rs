//! Ordered parameter storage for rendered queries.

use crate::types::Term;
use tokio_postgres::types::ToSql;

/// Parameters collected while rendering a query, in `$n` order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamList {
    params: Vec<Term>,
}

impl ParamList {
    /// Create a new empty parameter list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 1-based index.
    pub fn push(&mut self, value: Term) -> usize {
        self.params.push(value);
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Borrow the collected values.
    pub fn values(&self) -> &[Term] {
        &self.params
    }

    /// Get parameters as references compatible with tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}
