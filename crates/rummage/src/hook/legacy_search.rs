//! Lenient search stage for the older params dialect.
//!
//! Same wire format as [`SearchHook`](super::SearchHook), but entries it
//! cannot understand are dropped instead of rejected, `like`/`ilike` terms are
//! wrapped in `%...%`, and terms of the wrong shape are ignored at run time.
//! Unknown scope names still fail.

use super::search::{SearchOp, SearchParams, SearchSpec, compile, expand_scope};
use super::{FormatContext, Hook, as_object, term_of};
use crate::error::RummageResult;
use crate::query::{CombineMode, Query};
use crate::resolve::{AssociationPath, FieldRef};
use crate::types::Term;
use async_trait::async_trait;
use serde::Deserialize as _;
use serde_json::{Map, Value};

const NAME: &str = "legacy_search";

/// Parse an entry; `None` drops it.
fn parse_entry(name: &str, entry: &Map<String, Value>) -> RummageResult<Option<SearchSpec>> {
    let operator = match entry.get("search_type").and_then(Value::as_str) {
        Some(op) => match op.parse::<SearchOp>() {
            Ok(op) => op,
            Err(_) => return Ok(None),
        },
        None => return Ok(None),
    };
    let Some(term) = entry.get("search_term") else {
        return Ok(None);
    };
    let combine = match entry.get("search_expr") {
        None | Some(Value::Null) => CombineMode::And,
        Some(value) => match CombineMode::deserialize(value) {
            Ok(combine) => combine,
            Err(_) => return Ok(None),
        },
    };
    let field = match entry.get("field") {
        Some(value) => FieldRef::from_value(value)?,
        None => FieldRef::plain(name),
    };
    let assoc = match entry.get("assoc") {
        Some(value) => AssociationPath::from_value(value)?,
        None => AssociationPath::default(),
    };
    Ok(Some(SearchSpec {
        field,
        assoc,
        operator,
        term: term_of(term)?,
        combine,
    }))
}

fn wrap_wildcards(spec: &SearchSpec) -> Option<SearchSpec> {
    let Term::Text(text) = &spec.term else {
        return None;
    };
    if !matches!(spec.operator, SearchOp::Like | SearchOp::Ilike) {
        return None;
    }
    let mut wrapped = spec.clone();
    wrapped.term = Term::Text(format!("%{text}%"));
    Some(wrapped)
}

/// Legacy search stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySearchHook;

#[async_trait]
impl Hook for LegacySearchHook {
    type Params = SearchParams;

    fn name(&self) -> &str {
        NAME
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        _ctx: &FormatContext<'_>,
    ) -> RummageResult<SearchParams> {
        let map = as_object(NAME, &raw)?;
        let mut params = SearchParams::new();
        for (name, value) in map {
            let spec = match value {
                Value::Object(entry) => parse_entry(name, entry)?,
                other => Some(expand_scope(query, name, other)?),
            };
            if let Some(spec) = spec {
                params.0.push((name.clone(), spec));
            }
        }
        Ok(params)
    }

    fn run(&self, query: Query, params: &SearchParams) -> RummageResult<Query> {
        params.iter().try_fold(query, |query, (_, spec)| {
            if spec.check_term().is_err() {
                return Ok(query);
            }
            match wrap_wildcards(spec) {
                Some(wrapped) => compile(query, &wrapped),
                None => compile(query, spec),
            }
        })
    }
}
