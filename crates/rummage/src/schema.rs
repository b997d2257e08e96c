//! Runtime entity registry.
//!
//! Entities are described once at startup: table, keys, associations,
//! computed fields, named scopes and per-entity default hooks. Queries carry
//! a shared [`SchemaRegistry`] so every stage can look these up by name.

use crate::error::{RummageError, RummageResult};
use crate::hook::{HookRef, PaginateSpec, SearchSpec, SortSpec};
use crate::ident::Ident;
use crate::resolve::FieldRef;
use crate::types::Term;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named scope: turns the value supplied by the caller into a concrete spec.
pub type ScopeFn<T> = Arc<dyn Fn(&Term) -> RummageResult<T> + Send + Sync>;

/// A relation from one entity to another.
///
/// The join condition is `target.related_key = owner.owner_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub target: String,
    pub owner_key: String,
    pub related_key: String,
}

impl Association {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        owner_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            owner_key: owner_key.into(),
            related_key: related_key.into(),
        }
    }
}

/// Description of one entity.
#[derive(Clone)]
pub struct Schema {
    name: String,
    table: String,
    primary_key: Option<String>,
    unique_keys: Vec<String>,
    associations: HashMap<String, Association>,
    computed: HashMap<String, FieldRef>,
    search_scopes: HashMap<String, ScopeFn<SearchSpec>>,
    sort_scopes: HashMap<String, ScopeFn<SortSpec>>,
    paginate_scopes: HashMap<String, ScopeFn<PaginateSpec>>,
    hooks: HashMap<String, HookRef>,
}

impl Schema {
    /// Start describing entity `name` stored in `table`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: None,
            unique_keys: Vec::new(),
            associations: HashMap::new(),
            computed: HashMap::new(),
            search_scopes: HashMap::new(),
            sort_scopes: HashMap::new(),
            paginate_scopes: HashMap::new(),
            hooks: HashMap::new(),
        }
    }

    /// Set the single-column primary key.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Declare another single-column unique key (usable for keyset pagination).
    pub fn unique_key(mut self, column: impl Into<String>) -> Self {
        self.unique_keys.push(column.into());
        self
    }

    /// `self.foreign_key -> target.id`
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associate(Association::new(name, target, foreign_key, "id"))
    }

    /// `self.id <- target.foreign_key`, at most one row.
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associate(Association::new(name, target, "id", foreign_key))
    }

    /// `self.id <- target.foreign_key`
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associate(Association::new(name, target, "id", foreign_key))
    }

    pub fn associate(mut self, association: Association) -> Self {
        self.associations
            .insert(association.name.clone(), association);
        self
    }

    /// Register a computed field; plain references to `name` resolve to it.
    pub fn computed(mut self, name: impl Into<String>, field: FieldRef) -> Self {
        self.computed.insert(name.into(), field);
        self
    }

    pub fn search_scope<F>(mut self, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn(&Term) -> RummageResult<SearchSpec> + Send + Sync + 'static,
    {
        self.search_scopes.insert(name.into(), Arc::new(producer));
        self
    }

    pub fn sort_scope<F>(mut self, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn(&Term) -> RummageResult<SortSpec> + Send + Sync + 'static,
    {
        self.sort_scopes.insert(name.into(), Arc::new(producer));
        self
    }

    pub fn paginate_scope<F>(mut self, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn(&Term) -> RummageResult<PaginateSpec> + Send + Sync + 'static,
    {
        self.paginate_scopes.insert(name.into(), Arc::new(producer));
        self
    }

    /// Default hook for `stage` whenever this entity is the query's base.
    pub fn hook(mut self, stage: impl Into<String>, hook: HookRef) -> Self {
        self.hooks.insert(stage.into(), hook);
        self
    }

    // ==================== Lookups ====================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key_column(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Whether `column` is the primary key or a declared unique key.
    pub fn is_unique_key(&self, column: &str) -> bool {
        self.primary_key.as_deref() == Some(column) || self.unique_keys.iter().any(|k| k == column)
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn computed_field(&self, name: &str) -> Option<&FieldRef> {
        self.computed.get(name)
    }

    pub(crate) fn search_scope_fn(&self, name: &str) -> RummageResult<&ScopeFn<SearchSpec>> {
        self.search_scopes
            .get(name)
            .ok_or_else(|| RummageError::unknown_scope("search", name, &self.name))
    }

    pub(crate) fn sort_scope_fn(&self, name: &str) -> RummageResult<&ScopeFn<SortSpec>> {
        self.sort_scopes
            .get(name)
            .ok_or_else(|| RummageError::unknown_scope("sort", name, &self.name))
    }

    pub(crate) fn paginate_scope_fn(&self, name: &str) -> RummageResult<&ScopeFn<PaginateSpec>> {
        self.paginate_scopes
            .get(name)
            .ok_or_else(|| RummageError::unknown_scope("paginate", name, &self.name))
    }

    pub fn hook_for(&self, stage: &str) -> Option<&HookRef> {
        self.hooks.get(stage)
    }

    fn validate(&self) -> RummageResult<()> {
        Ident::parse(&self.table)?;
        if let Some(pk) = &self.primary_key {
            Ident::parse(pk)?;
        }
        for key in &self.unique_keys {
            Ident::parse(key)?;
        }
        for assoc in self.associations.values() {
            Ident::parse(&assoc.owner_key)?;
            Ident::parse(&assoc.related_key)?;
        }
        for field in self.computed.values() {
            for column in field.columns() {
                Ident::parse(column)?;
            }
        }
        Ok(())
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("unique_keys", &self.unique_keys)
            .field("associations", &sorted_keys(&self.associations))
            .field("computed", &sorted_keys(&self.computed))
            .field("search_scopes", &sorted_keys(&self.search_scopes))
            .field("sort_scopes", &sorted_keys(&self.sort_scopes))
            .field("paginate_scopes", &sorted_keys(&self.paginate_scopes))
            .field("hooks", &sorted_keys(&self.hooks))
            .finish()
    }
}

/// Registry of entity schemas, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create a new empty schema registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register an entity, replacing any previous one with the same name.
    pub fn register(&mut self, schema: Schema) -> RummageResult<()> {
        schema.validate()?;
        self.entities
            .insert(schema.name.clone(), Arc::new(schema));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, schema: Schema) -> RummageResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn get(&self, entity: &str) -> Option<&Arc<Schema>> {
        self.entities.get(entity)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
