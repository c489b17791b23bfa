//! Fluent query builder over an entity type.
//!
//! A [`Query`] collects predicates, ordering, paging and captured values.
//! Nothing is compiled until [`Query::compile`] is called, so a query can be
//! built once and compiled for several dialects.
//!
//! # Examples
//!
//! ```
//! use std::sync::LazyLock;
//! use sqlweave_db::dialect::Dialect;
//! use sqlweave_db::entity::{ColumnDef, ColumnKind, Entity, EntityMeta};
//! use sqlweave_db::query::{Expr, Query};
//!
//! struct Person;
//! impl Entity for Person {
//!     fn meta() -> &'static EntityMeta {
//!         static META: LazyLock<EntityMeta> = LazyLock::new(|| {
//!             EntityMeta::new("Person", "Person")
//!                 .column(ColumnDef::new("Id", ColumnKind::Int).primary_key())
//!                 .column(ColumnDef::new("Age", ColumnKind::Int))
//!         });
//!         &META
//!     }
//! }
//!
//! let query = Query::<Person>::new()
//!     .filter(Expr::member("Age").gte(Expr::captured("min_age")))
//!     .bind("min_age", 18)
//!     .take(10);
//! let compiled = query.compile(Dialect::Sqlite).unwrap();
//! assert!(compiled.select_sql().ends_with("LIMIT 0,10;"));
//! ```

use std::marker::PhantomData;

use sqlweave_core::{WeaveResult, SETTINGS};

use super::compiler::{CompiledQuery, PredicateCompiler};
use super::expr::{Bindings, Expr};
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::value::Value;

/// A lazily compiled query over entity `E`.
#[derive(Debug)]
pub struct Query<E: Entity> {
    exprs: Vec<Expr>,
    bindings: Bindings,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            exprs: self.exprs.clone(),
            bindings: self.bindings.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Query<E> {
    /// Creates a query matching every row.
    pub fn new() -> Self {
        Self {
            exprs: Vec::new(),
            bindings: Bindings::new(),
            _entity: PhantomData,
        }
    }

    // ── Building (lazy) ─────────────────────────────────────────────

    /// Adds a predicate. Predicates are combined with `AND`.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.exprs.push(predicate);
        self
    }

    /// Adds a negated predicate.
    #[must_use]
    pub fn exclude(self, predicate: Expr) -> Self {
        self.filter(!predicate)
    }

    /// Orders ascending by `path`. Only the first ordering applies.
    #[must_use]
    pub fn order_by(self, path: &str) -> Self {
        self.filter(Expr::order_by(path))
    }

    /// Orders descending by `path`. Only the first ordering applies.
    #[must_use]
    pub fn order_by_descending(self, path: &str) -> Self {
        self.filter(Expr::order_by_descending(path))
    }

    /// Skips `n` rows. Only the first skip applies.
    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        self.filter(Expr::skip(n))
    }

    /// Returns at most `n` rows. Only the first take applies.
    #[must_use]
    pub fn take(self, n: u64) -> Self {
        self.filter(Expr::take(n))
    }

    /// Binds a captured value referenced by [`Expr::Captured`].
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.bind(name, value);
        self
    }

    /// The predicates and modifiers, in the order they were added.
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    /// The captured values.
    pub const fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    // ── Compilation ─────────────────────────────────────────────────

    /// Compiles the query for `dialect`.
    pub fn compile(&self, dialect: Dialect) -> WeaveResult<CompiledQuery> {
        self.compile_with(PredicateCompiler::new(E::meta(), dialect))
    }

    /// Compiles the query with a prepared compiler, e.g. one with a seeded
    /// alias generator.
    pub fn compile_with(&self, mut compiler: PredicateCompiler) -> WeaveResult<CompiledQuery> {
        for expr in &self.exprs {
            compiler.translate(expr, &self.bindings)?;
        }
        compiler.finish()
    }

    /// Compiles the query for the dialect named in the global settings.
    ///
    /// Falls back to MSSQL when settings are not configured.
    pub fn compile_default(&self) -> WeaveResult<CompiledQuery> {
        let dialect = match SETTINGS.try_get() {
            Some(settings) => settings.default_dialect.parse()?,
            None => Dialect::Mssql,
        };
        self.compile(dialect)
    }
}
