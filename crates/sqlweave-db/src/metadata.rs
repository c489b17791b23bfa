//! Process-wide metadata cache.
//!
//! Rendering the column list of an entity and looking up the enum type of a
//! property happen on every compilation, so both are memoized here for the
//! lifetime of the process. Entries are filled on first use and never
//! evicted; entity metadata is static, so they never go stale.
//!
//! Column lists are keyed by type name and table; the enum registry by
//! `Type.Property`, so [`EntityMeta::type_name`] must be unique per entity.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::dialect::Dialect;
use crate::entity::{EntityMeta, EnumDef};

type ColumnKey = (&'static str, String, Dialect);

static COLUMNS: LazyLock<DashMap<ColumnKey, Arc<[String]>>> = LazyLock::new(DashMap::new);

static ENUMS: LazyLock<DashMap<String, &'static EnumDef>> = LazyLock::new(DashMap::new);

/// Returns the dialect-qualified column list of an entity (`Table.[col]`),
/// in declaration order.
pub fn columns(meta: &EntityMeta, dialect: Dialect) -> Arc<[String]> {
    COLUMNS
        .entry((meta.type_name, meta.table.clone(), dialect))
        .or_insert_with(|| {
            tracing::trace!(entity = meta.type_name, %dialect, "caching column list");
            let table = dialect.table_name(&meta.table);
            meta.columns
                .iter()
                .map(|c| dialect.qualified_column(&table, &c.column))
                .collect()
        })
        .clone()
}

/// Returns the qualified-property key used by the enum registry.
pub fn enum_key(meta: &EntityMeta, property: &str) -> String {
    format!("{}.{property}", meta.type_name)
}

/// Registers the enum type of a qualified property (`Type.Property`).
pub fn register_enum(qualified_property: impl Into<String>, def: &'static EnumDef) {
    ENUMS.insert(qualified_property.into(), def);
}

/// Looks up a registered enum type by qualified property name.
pub fn enum_type(qualified_property: &str) -> Option<&'static EnumDef> {
    ENUMS.get(qualified_property).map(|entry| *entry.value())
}

/// Returns the enum type of `property` on `meta`, registering it on first use.
pub fn enum_for(meta: &EntityMeta, property: &str) -> Option<&'static EnumDef> {
    let key = enum_key(meta, property);
    if let Some(def) = enum_type(&key) {
        return Some(def);
    }
    let def = meta.column_for(property)?.enum_type?;
    tracing::trace!(property = %key, enum_type = def.name, "registering enum type");
    Some(*ENUMS.entry(key).or_insert(def).value())
}
