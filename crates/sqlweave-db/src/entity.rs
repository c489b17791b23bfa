//! Entity metadata consumed by the predicate compiler.
//!
//! The [`Entity`] trait exposes a static [`EntityMeta`] describing the table,
//! its columns, and its navigation properties. Metadata is normally declared
//! once per type in a `LazyLock` and built with the builder methods on
//! [`EntityMeta`] and [`ColumnDef`].

use sqlweave_core::{WeaveError, WeaveResult};

use crate::cipher::CipherSpec;
use crate::value::ValueClass;

/// Lazily resolved reference to another entity's metadata.
///
/// A function pointer rather than a reference so that entities can refer to
/// each other cyclically from their `LazyLock` initializers.
pub type EntityRef = fn() -> &'static EntityMeta;

/// A type that maps to a database table.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use sqlweave_db::entity::{ColumnDef, ColumnKind, Entity, EntityMeta};
///
/// struct Person;
///
/// impl Entity for Person {
///     fn meta() -> &'static EntityMeta {
///         static META: LazyLock<EntityMeta> = LazyLock::new(|| {
///             EntityMeta::new("Person", "Person")
///                 .column(ColumnDef::new("Id", ColumnKind::Int).primary_key())
///                 .column(ColumnDef::new("Name", ColumnKind::String))
///         });
///         &META
///     }
/// }
///
/// assert_eq!(Person::meta().primary_key().unwrap().column, "Id");
/// ```
pub trait Entity: Send + Sync + 'static {
    /// Returns the static metadata for this entity type.
    fn meta() -> &'static EntityMeta;
}

/// The storage kind of a column, used to pick literal syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Integer column.
    Int,
    /// Decimal or floating-point column.
    Decimal,
    /// Boolean / bit column.
    Bool,
    /// Text column.
    String,
    /// Date or date-time column.
    DateTime,
    /// GUID / UUID column.
    Guid,
    /// Enum column stored as its ordinal (or its name when stringified).
    Enum,
}

impl ColumnKind {
    /// The literal class values compared against this column render as.
    pub const fn literal_class(self) -> ValueClass {
        match self {
            Self::Int | Self::Enum => ValueClass::Numeric,
            Self::Decimal => ValueClass::Decimal,
            Self::Bool => ValueClass::Bool,
            Self::String => ValueClass::String,
            Self::DateTime => ValueClass::Date,
            Self::Guid => ValueClass::Guid,
        }
    }
}

/// An enum type with ordinal and declared name per variant.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDef {
    /// The enum type name.
    pub name: &'static str,
    /// `(ordinal, declared name)` pairs.
    pub variants: &'static [(i64, &'static str)],
}

impl EnumDef {
    /// Returns the declared name for an ordinal.
    pub fn name_of(&self, ordinal: i64) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(value, _)| *value == ordinal)
            .map(|(_, name)| *name)
    }

    /// Returns `true` if `name` is one of the declared variant names.
    pub fn has_name(&self, name: &str) -> bool {
        self.variants.iter().any(|(_, n)| *n == name)
    }
}

/// A column of an entity table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// The property name used in predicate member paths.
    pub property: &'static str,
    /// The database column name.
    pub column: String,
    /// The storage kind.
    pub kind: ColumnKind,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// The entity this column references, if it is a foreign key.
    pub foreign_key: Option<EntityRef>,
    /// The enum type of the column, if any.
    pub enum_type: Option<&'static EnumDef>,
    /// Whether enum values are stored by declared name instead of ordinal.
    pub stringify: bool,
    /// Encryption annotation.
    pub cipher: Option<CipherSpec>,
}

impl ColumnDef {
    /// Creates a column whose database name equals the property name.
    pub fn new(property: &'static str, kind: ColumnKind) -> Self {
        Self {
            property,
            column: property.to_string(),
            kind,
            primary_key: false,
            foreign_key: None,
            enum_type: None,
            stringify: false,
            cipher: None,
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this column as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks this column as a foreign key to `target`.
    #[must_use]
    pub fn foreign_key(mut self, target: EntityRef) -> Self {
        self.foreign_key = Some(target);
        self
    }

    /// Declares the column's enum type.
    #[must_use]
    pub const fn enum_type(mut self, def: &'static EnumDef) -> Self {
        self.kind = ColumnKind::Enum;
        self.enum_type = Some(def);
        self
    }

    /// Stores the enum by declared name rather than ordinal.
    #[must_use]
    pub const fn stringify(mut self) -> Self {
        self.stringify = true;
        self
    }

    /// Encrypts values bound to this column.
    #[must_use]
    pub fn encrypted(mut self, spec: CipherSpec) -> Self {
        self.cipher = Some(spec);
        self
    }
}

/// A navigation property from one entity to another.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// The property name used in member paths.
    pub property: &'static str,
    /// The entity on the other side.
    pub target: EntityRef,
    /// `true` for a collection navigation (one-to-many).
    pub many: bool,
}

impl Navigation {
    /// A single-valued navigation.
    pub fn one(property: &'static str, target: EntityRef) -> Self {
        Self {
            property,
            target,
            many: false,
        }
    }

    /// A collection navigation.
    pub fn many(property: &'static str, target: EntityRef) -> Self {
        Self {
            property,
            target,
            many: true,
        }
    }
}

/// Metadata for one entity type.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    /// The entity type name. Identifies the entity process-wide: it keys the
    /// metadata cache and foreign-key matching, so it must be unique.
    pub type_name: &'static str,
    /// The table name as written in SQL (bracketed names are normalized per dialect).
    pub table: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Navigation properties.
    pub navigations: Vec<Navigation>,
}

impl EntityMeta {
    /// Creates metadata with no columns.
    ///
    /// `type_name` must be unique among all entities in the process. Two
    /// entities sharing a name share one cached column list and enum
    /// registry entries.
    pub fn new(type_name: &'static str, table: impl Into<String>) -> Self {
        Self {
            type_name,
            table: table.into(),
            columns: Vec::new(),
            navigations: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a navigation property.
    #[must_use]
    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigations.push(navigation);
        self
    }

    /// Returns the primary key column.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::MetadataError`] if no column is marked as the
    /// primary key.
    pub fn primary_key(&self) -> WeaveResult<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key).ok_or_else(|| {
            WeaveError::MetadataError(format!("Entity '{}' has no primary key", self.type_name))
        })
    }

    /// Looks up a column by property name.
    pub fn column_for(&self, property: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Looks up a navigation by property name.
    pub fn navigation_for(&self, property: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.property == property)
    }

    /// Returns the first foreign key column on this entity referencing `target`.
    pub fn foreign_key_to(&self, target: &EntityMeta) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| {
            c.foreign_key.is_some_and(|fk| fk().is_same(target))
        })
    }

    /// Returns `true` if both describe the same entity type.
    pub fn is_same(&self, other: &EntityMeta) -> bool {
        self.type_name == other.type_name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::cipher::KeySize;

    static STATUS: EnumDef = EnumDef {
        name: "Status",
        variants: &[(0, "Pending"), (1, "Active"), (2, "Closed")],
    };

    fn customer() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::new("Customer", "Customer")
                .column(ColumnDef::new("Id", ColumnKind::Int).primary_key())
                .column(ColumnDef::new("Name", ColumnKind::String))
                .navigation(Navigation::many("Orders", order))
        });
        &META
    }

    fn order() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::new("Order", "[dbo].[Orders]")
                .column(ColumnDef::new("Id", ColumnKind::Int).primary_key())
                .column(ColumnDef::new("CustomerId", ColumnKind::Int).foreign_key(customer))
                .column(ColumnDef::new("Status", ColumnKind::Int).enum_type(&STATUS).stringify())
                .column(
                    ColumnDef::new("Secret", ColumnKind::String)
                        .column("secret_value")
                        .encrypted(CipherSpec::new("k", KeySize::Key128)),
                )
                .navigation(Navigation::one("Customer", customer))
        });
        &META
    }

    #[test]
    fn test_primary_key_lookup() {
        assert_eq!(order().primary_key().unwrap().property, "Id");
        let keyless = EntityMeta::new("Keyless", "Keyless");
        assert!(matches!(
            keyless.primary_key(),
            Err(WeaveError::MetadataError(_))
        ));
    }

    #[test]
    fn test_column_builder() {
        let status = order().column_for("Status").unwrap();
        assert_eq!(status.kind, ColumnKind::Enum);
        assert!(status.stringify);
        let secret = order().column_for("Secret").unwrap();
        assert_eq!(secret.column, "secret_value");
        assert!(secret.cipher.is_some());
        assert!(order().column_for("Missing").is_none());
    }

    #[test]
    fn test_foreign_key_to() {
        let fk = order().foreign_key_to(customer()).unwrap();
        assert_eq!(fk.property, "CustomerId");
        assert!(customer().foreign_key_to(order()).is_none());
    }

    #[test]
    fn test_navigation_for() {
        assert!(customer().navigation_for("Orders").unwrap().many);
        assert!(!order().navigation_for("Customer").unwrap().many);
        assert!(order().navigation_for("Lines").is_none());
    }

    #[test]
    fn test_enum_def() {
        assert_eq!(STATUS.name_of(1), Some("Active"));
        assert_eq!(STATUS.name_of(9), None);
        assert!(STATUS.has_name("Closed"));
        assert!(!STATUS.has_name("Open"));
    }

    #[test]
    fn test_literal_class() {
        assert_eq!(ColumnKind::Enum.literal_class(), ValueClass::Numeric);
        assert_eq!(ColumnKind::Guid.literal_class(), ValueClass::Guid);
        assert_eq!(ColumnKind::DateTime.literal_class(), ValueClass::Date);
    }
}
