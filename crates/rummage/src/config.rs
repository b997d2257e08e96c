//! Pipeline configuration and per-call options.
//!
//! Hook lookup for a stage, first match wins:
//! 1. [`Options`] passed to the call
//! 2. hooks registered on the query's base [`Schema`](crate::Schema)
//! 3. [`RummageConfig`] hooks
//! 4. built-in hooks for `search`, `sort` and `paginate`

use crate::error::{RummageError, RummageResult};
use crate::hook::{HookRef, PAGINATE, PaginateHook, SEARCH, SORT, SearchHook, SortHook};
use crate::repo::Repository;
use crate::schema::Schema;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Page size used when neither params nor options give one.
pub const DEFAULT_PER_PAGE: i64 = 10;

/// When paginate (and any later stage) formats its params.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatMode {
    /// Format every stage against the incoming query, then run them all.
    /// Paginate counts rows of the unfiltered query.
    #[default]
    TwoPass,
    /// Format and run one stage at a time, so each stage sees the query the
    /// previous stages produced. Paginate counts rows after search.
    Threaded,
}

/// Process-wide defaults, passed explicitly to [`Rummage`](crate::Rummage).
#[derive(Clone)]
pub struct RummageConfig {
    pub default_per_page: i64,
    pub stages: Vec<String>,
    pub hooks: HashMap<String, HookRef>,
    pub format_mode: FormatMode,
}

impl Default for RummageConfig {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            stages: vec![SEARCH.to_string(), SORT.to_string(), PAGINATE.to_string()],
            hooks: HashMap::new(),
            format_mode: FormatMode::TwoPass,
        }
    }
}

impl RummageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn per_page(mut self, per_page: i64) -> Self {
        self.default_per_page = per_page.max(1);
        self
    }

    pub fn stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = stages.into_iter().map(Into::into).collect();
        self
    }

    pub fn hook(mut self, stage: impl Into<String>, hook: HookRef) -> Self {
        self.hooks.insert(stage.into(), hook);
        self
    }

    pub fn format_mode(mut self, mode: FormatMode) -> Self {
        self.format_mode = mode;
        self
    }
}

impl fmt::Debug for RummageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<(&str, &str)> = self
            .hooks
            .iter()
            .map(|(stage, hook)| (stage.as_str(), hook.name()))
            .collect();
        hooks.sort_unstable();
        f.debug_struct("RummageConfig")
            .field("default_per_page", &self.default_per_page)
            .field("stages", &self.stages)
            .field("hooks", &hooks)
            .field("format_mode", &self.format_mode)
            .finish()
    }
}

/// Call-site options.
#[derive(Clone, Default)]
pub struct Options<'a> {
    pub repo: Option<&'a dyn Repository>,
    pub hooks: HashMap<String, HookRef>,
    pub stages: Option<Vec<String>>,
    pub per_page: Option<i64>,
}

impl<'a> Options<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository used by stages that read data (paginate).
    pub fn repo(mut self, repo: &'a dyn Repository) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn hook(mut self, stage: impl Into<String>, hook: HookRef) -> Self {
        self.hooks.insert(stage.into(), hook);
        self
    }

    pub fn stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = Some(stages.into_iter().map(Into::into).collect());
        self
    }

    pub fn per_page(mut self, per_page: i64) -> Self {
        self.per_page = Some(per_page.max(1));
        self
    }
}

impl fmt::Debug for Options<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        hooks.sort_unstable();
        f.debug_struct("Options")
            .field("repo", &self.repo.is_some())
            .field("hooks", &hooks)
            .field("stages", &self.stages)
            .field("per_page", &self.per_page)
            .finish()
    }
}

fn builtin_hook(stage: &str) -> Option<HookRef> {
    match stage {
        SEARCH => Some(Arc::new(SearchHook)),
        SORT => Some(Arc::new(SortHook)),
        PAGINATE => Some(Arc::new(PaginateHook)),
        _ => None,
    }
}

/// Pick the hook for `stage`.
pub fn resolve_hook(
    stage: &str,
    options: &Options<'_>,
    schema: &Schema,
    config: &RummageConfig,
) -> RummageResult<HookRef> {
    options
        .hooks
        .get(stage)
        .or_else(|| schema.hook_for(stage))
        .or_else(|| config.hooks.get(stage))
        .cloned()
        .or_else(|| builtin_hook(stage))
        .ok_or_else(|| RummageError::UnknownHook(stage.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{KeysetPaginateHook, LegacySearchHook, LegacySortHook};

    #[test]
    fn builtins_by_default() {
        let schema = Schema::new("product", "products");
        let config = RummageConfig::default();
        let options = Options::new();
        let hook = resolve_hook(SEARCH, &options, &schema, &config).unwrap();
        assert_eq!(hook.name(), "search");
        let hook = resolve_hook(PAGINATE, &options, &schema, &config).unwrap();
        assert_eq!(hook.name(), "paginate");
    }

    #[test]
    fn precedence_options_schema_config() {
        let schema = Schema::new("product", "products")
            .hook(SEARCH, Arc::new(LegacySearchHook))
            .hook(PAGINATE, Arc::new(KeysetPaginateHook));
        let config = RummageConfig::default()
            .hook(SEARCH, Arc::new(SearchHook))
            .hook(SORT, Arc::new(LegacySortHook));
        let options = Options::new().hook(PAGINATE, Arc::new(PaginateHook));

        assert_eq!(
            resolve_hook(SEARCH, &options, &schema, &config).unwrap().name(),
            "legacy_search"
        );
        assert_eq!(
            resolve_hook(SORT, &options, &schema, &config).unwrap().name(),
            "legacy_sort"
        );
        assert_eq!(
            resolve_hook(PAGINATE, &options, &schema, &config).unwrap().name(),
            "paginate"
        );
    }

    #[test]
    fn unknown_stage() {
        let schema = Schema::new("product", "products");
        let err = resolve_hook("facet", &Options::new(), &schema, &RummageConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, RummageError::UnknownHook(ref s) if s == "facet"));
    }

    #[test]
    fn per_page_floor() {
        assert_eq!(RummageConfig::new().per_page(0).default_per_page, 1);
        assert_eq!(Options::new().per_page(-5).per_page, Some(1));
    }
}
