//! Stage hooks: the pluggable search, sort and paginate transformations.
//!
//! A hook normalizes its slice of the params map (`format_params`) and then
//! applies it to a query (`run`). Implement [`Hook`] with a typed `Params`;
//! the pipeline drives it through the object-safe [`DynHook`] adapter, which
//! moves params in and out of their JSON form.

use crate::error::{RummageError, RummageResult};
use crate::query::Query;
use crate::repo::Repository;
use crate::types::Term;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize as _, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub mod keyset;
pub mod legacy_search;
pub mod legacy_sort;
pub mod paginate;
pub mod search;
pub mod sort;

pub use keyset::{KeysetPaginateHook, KeysetSpec};
pub use legacy_search::LegacySearchHook;
pub use legacy_sort::LegacySortHook;
pub use paginate::{PaginateHook, PaginateSpec, precompute};
pub use search::{SearchHook, SearchOp, SearchParams, SearchSpec};
pub use sort::{SortHook, SortParams, SortSpec};

/// Stage name for searching.
pub const SEARCH: &str = "search";
/// Stage name for sorting.
pub const SORT: &str = "sort";
/// Stage name for pagination.
pub const PAGINATE: &str = "paginate";

/// Per-call inputs available while formatting params.
#[derive(Clone, Copy)]
pub struct FormatContext<'a> {
    /// Repository for stages that need to look at data (paginate counts rows).
    pub repo: Option<&'a dyn Repository>,
    /// Page size used when params leave `per_page` out.
    pub per_page: i64,
}

impl<'a> FormatContext<'a> {
    pub fn new(per_page: i64) -> Self {
        Self {
            repo: None,
            per_page,
        }
    }

    pub fn with_repo(mut self, repo: &'a dyn Repository) -> Self {
        self.repo = Some(repo);
        self
    }
}

impl fmt::Debug for FormatContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatContext")
            .field("repo", &self.repo.is_some())
            .field("per_page", &self.per_page)
            .finish()
    }
}

/// A pipeline stage with typed params.
///
/// Both operations fail with [`RummageError::NotImplemented`] unless
/// overridden, so a half-written custom stage cannot silently pass queries
/// through.
#[async_trait]
pub trait Hook: Send + Sync {
    type Params: Serialize + DeserializeOwned + Send + Sync;

    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Normalize raw params: fill defaults, expand scopes, validate shape.
    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        ctx: &FormatContext<'_>,
    ) -> RummageResult<Self::Params> {
        let _ = (query, raw, ctx);
        Err(RummageError::not_implemented(Hook::name(self), "format_params"))
    }

    /// Apply normalized params to the query.
    fn run(&self, query: Query, params: &Self::Params) -> RummageResult<Query> {
        let _ = (query, params);
        Err(RummageError::not_implemented(Hook::name(self), "run"))
    }
}

/// Object-safe view of a [`Hook`] working on JSON params.
#[async_trait]
pub trait DynHook: Send + Sync {
    fn name(&self) -> &str;

    async fn format_value(
        &self,
        query: &Query,
        raw: Value,
        ctx: &FormatContext<'_>,
    ) -> RummageResult<Value>;

    fn run_value(&self, query: Query, params: &Value) -> RummageResult<Query>;
}

#[async_trait]
impl<H: Hook> DynHook for H {
    fn name(&self) -> &str {
        Hook::name(self)
    }

    async fn format_value(
        &self,
        query: &Query,
        raw: Value,
        ctx: &FormatContext<'_>,
    ) -> RummageResult<Value> {
        let params = self.format_params(query, raw, ctx).await?;
        Ok(serde_json::to_value(params)?)
    }

    fn run_value(&self, query: Query, params: &Value) -> RummageResult<Query> {
        let params = H::Params::deserialize(params)?;
        self.run(query, &params)
    }
}

/// Shared handle to a hook.
pub type HookRef = Arc<dyn DynHook>;

// ==================== Wire helpers ====================

pub(crate) fn as_object<'v>(hook: &str, value: &'v Value) -> RummageResult<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        RummageError::invalid(format!("{hook} params must be an object, got {value}"))
    })
}

/// Integer from a JSON number or numeric string; `None` when absent or null.
pub(crate) fn int_param(map: &Map<String, Value>, key: &str) -> RummageResult<Option<i64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| RummageError::invalid(format!("`{key}` must be an integer, got {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RummageError::invalid(format!("`{key}` must be an integer, got {s:?}"))),
        Some(other) => Err(RummageError::invalid(format!(
            "`{key}` must be an integer, got {other}"
        ))),
    }
}

pub(crate) fn term_of(value: &Value) -> RummageResult<Term> {
    Ok(Term::deserialize(value)?)
}

/// `{"scope": "name", "value": ...}` references a named scope.
pub(crate) fn scope_ref(map: &Map<String, Value>) -> RummageResult<Option<(&str, Term)>> {
    let Some(name) = map.get("scope") else {
        return Ok(None);
    };
    let name = name
        .as_str()
        .ok_or_else(|| RummageError::invalid("`scope` must be a scope name"))?;
    let value = match map.get("value") {
        Some(value) => term_of(value)?,
        None => Term::Null,
    };
    Ok(Some((name, value)))
}
