//! Keyset pagination: seek past the last key seen instead of counting rows.
//!
//! Wire format: `{"per_page": 10, "page": 1, "last_seen_key": 42, "key_field": "id"}`.
//! `key_field` defaults to the primary key and must be the primary key or a
//! declared unique key. Ordering by the key is left to the caller.

use super::{FormatContext, Hook, as_object, int_param, term_of};
use crate::error::{RummageError, RummageResult};
use crate::expr::{CompareOp, Expr, Operand};
use crate::ident::qualified;
use crate::query::Query;
use crate::types::Term;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NAME: &str = "keyset_paginate";

/// Keyset page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysetSpec {
    pub per_page: i64,
    pub page: i64,
    #[serde(default = "null_term")]
    pub last_seen_key: Term,
    pub key_field: String,
}

fn null_term() -> Term {
    Term::Null
}

/// Keyset pagination stage; performs no count query.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeysetPaginateHook;

#[async_trait]
impl Hook for KeysetPaginateHook {
    type Params = KeysetSpec;

    fn name(&self) -> &str {
        NAME
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        ctx: &FormatContext<'_>,
    ) -> RummageResult<KeysetSpec> {
        let map = as_object(NAME, &raw)?;
        let schema = query.base_schema();
        let key_field = match map.get("key_field") {
            Some(Value::String(key)) => key.clone(),
            Some(other) if !other.is_null() => {
                return Err(RummageError::invalid(format!(
                    "key_field must be a column name, got {other}"
                )));
            }
            _ => schema
                .primary_key_column()
                .ok_or_else(|| RummageError::missing_key(NAME, "key_field"))?
                .to_string(),
        };
        if !schema.is_unique_key(&key_field) {
            return Err(RummageError::invalid(format!(
                "`{key_field}` is not a unique key of `{}`",
                schema.name()
            )));
        }
        let last_seen_key = match map.get("last_seen_key") {
            Some(value) => term_of(value)?,
            None => Term::Null,
        };
        Ok(KeysetSpec {
            per_page: int_param(map, "per_page")?.unwrap_or(ctx.per_page).max(1),
            page: int_param(map, "page")?.unwrap_or(1).max(1),
            last_seen_key,
            key_field,
        })
    }

    fn run(&self, query: Query, params: &KeysetSpec) -> RummageResult<Query> {
        let query = if params.last_seen_key.is_blank() {
            query
        } else {
            let key = Operand::new(qualified(query.base_binding().alias(), &params.key_field)?);
            query.and_where(Expr::compare(key, CompareOp::Gt, params.last_seen_key.clone()))
        };
        Ok(query.limit(params.per_page.max(1)))
    }
}
