//! Lenient sort stage for the older params dialect.
//!
//! Items may be objects (as for [`SortHook`](super::SortHook)) or strings of
//! the form `"field.dir"` / `"field.dir.ci"`. A missing or unknown direction
//! keeps the item but makes it a no-op; items without a field are dropped.

use super::sort::{SortParams, SortSpec, compile, expand_scope, items};
use super::{FormatContext, Hook};
use crate::error::RummageResult;
use crate::query::{Query, SortDirection};
use crate::resolve::{AssociationPath, FieldRef};
use async_trait::async_trait;
use serde_json::Value;

const NAME: &str = "legacy_sort";

fn direction_of(value: Option<&str>) -> Option<SortDirection> {
    value.and_then(|dir| dir.parse().ok())
}

fn parse_str(item: &str) -> Option<SortSpec> {
    let mut parts = item.split('.');
    let field = parts.next().filter(|f| !f.is_empty())?;
    let direction = direction_of(parts.next());
    let case_insensitive = parts.next() == Some("ci");
    Some(SortSpec {
        field: FieldRef::plain(field),
        assoc: AssociationPath::default(),
        direction,
        case_insensitive,
    })
}

fn parse_item(query: &Query, item: &Value) -> RummageResult<Option<SortSpec>> {
    let map = match item {
        Value::String(s) => return Ok(parse_str(s)),
        Value::Object(map) => map,
        _ => return Ok(None),
    };
    if let Some(spec) = expand_scope(query, map)? {
        return Ok(Some(spec));
    }
    let Some(field) = map.get("field") else {
        return Ok(None);
    };
    let assoc = match map.get("assoc") {
        Some(value) => AssociationPath::from_value(value)?,
        None => AssociationPath::default(),
    };
    Ok(Some(SortSpec {
        field: FieldRef::from_value(field)?,
        assoc,
        direction: direction_of(map.get("order").and_then(Value::as_str)),
        case_insensitive: map.get("ci").and_then(Value::as_bool).unwrap_or(false),
    }))
}

/// Legacy sort stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySortHook;

#[async_trait]
impl Hook for LegacySortHook {
    type Params = SortParams;

    fn name(&self) -> &str {
        NAME
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        _ctx: &FormatContext<'_>,
    ) -> RummageResult<SortParams> {
        let raw = match raw {
            Value::String(_) => Value::Array(vec![raw]),
            other => other,
        };
        let mut specs = Vec::new();
        for item in items(NAME, &raw)? {
            if let Some(spec) = parse_item(query, item)? {
                specs.push(spec);
            }
        }
        Ok(SortParams(specs))
    }

    fn run(&self, query: Query, params: &SortParams) -> RummageResult<Query> {
        params.iter().try_fold(query, compile)
    }
}
