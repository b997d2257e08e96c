//! # rummage
//!
//! Declarative search, sort and pagination for PostgreSQL queries.
//!
//! Describe entities once in a [`SchemaRegistry`], start a [`Query`] from one
//! of them, and hand the query plus a request-shaped params map to the
//! pipeline. Each stage (search, sort, paginate) is a pluggable [`Hook`] that
//! normalizes its params and then transforms the query. Field names, join
//! paths and computed fields are validated and rendered from a fixed
//! whitelist; search terms only ever travel as bound parameters.
//!
//! ```ignore
//! use rummage::{Options, Query, RummageParams, Schema, SchemaRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = SchemaRegistry::new()
//!     .with(Schema::new("product", "products").primary_key("id")
//!         .belongs_to("category", "category", "category_id"))?
//!     .with(Schema::new("category", "categories").primary_key("id"))?;
//! let query = Query::from_entity(Arc::new(registry), "product")?;
//!
//! let params = RummageParams::from_value(json!({
//!     "search": {"price": {"search_type": "lteq", "search_term": 10}},
//!     "sort": {"field": "name", "order": "asc"},
//!     "paginate": {"per_page": 2, "page": 1},
//! }))?;
//!
//! let (query, params) = rummage::rummage(query, params, &Options::new().repo(&client)).await?;
//! let rows = rummage::Repository::all(&client, &query).await?;
//! let pages = params.paginate().map(|p| p.max_page);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod expr;
pub mod hook;
pub mod ident;
pub mod param;
pub mod pipeline;
pub mod query;
pub mod repo;
pub mod resolve;
pub mod schema;
pub mod types;

pub use client::GenericClient;
pub use config::{DEFAULT_PER_PAGE, FormatMode, Options, RummageConfig, resolve_hook};
pub use error::{RummageError, RummageResult};
pub use expr::{CompareOp, Expr, Operand};
pub use hook::{
    DynHook, FormatContext, Hook, HookRef, KeysetPaginateHook, KeysetSpec, LegacySearchHook,
    LegacySortHook, PAGINATE, PaginateHook, PaginateSpec, SEARCH, SORT, SearchHook, SearchOp,
    SearchParams, SearchSpec, SortHook, SortParams, SortSpec,
};
pub use ident::Ident;
pub use param::ParamList;
pub use pipeline::{Rummage, RummageParams, rummage};
pub use query::{Binding, CombineMode, JoinKind, Query, SortDirection};
pub use repo::Repository;
pub use resolve::{AssocStep, AssociationPath, FieldRef, Template};
pub use schema::{Association, Schema, SchemaRegistry, ScopeFn};
pub use types::Term;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
