//! # sqlweave-db
//!
//! Predicate compiler for MSSQL, PostgreSQL and SQLite. Entities describe
//! themselves through the [`Entity`](entity::Entity) trait; predicate trees
//! built with [`Expr`](query::Expr) and collected by a [`Query`](query::Query)
//! compile into WHERE, JOIN, ORDER BY and paging clauses, and from there into
//! SELECT, first-row, COUNT and EXISTS statements.
//!
//! ## Architecture
//!
//! The [`PredicateCompiler`](query::PredicateCompiler) walks each predicate
//! tree and writes into a [`TokenBuffer`](query::TokenBuffer). Literals stay
//! deferred until the column they are compared with is known, at which point
//! enum values are replaced by their declared names and values bound to
//! encrypted columns go through the [`FieldCipher`](cipher::FieldCipher).
//! Column lists and enum types are memoized process-wide in [`metadata`].
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`dialect`] - SQL dialect differences
//! - [`entity`] - Entity, column, and navigation metadata
//! - [`metadata`] - Process-wide metadata cache
//! - [`cipher`] - Field encryption for annotated columns
//! - [`query`] - Predicate trees, token buffer, compiler, and query builder

// These clippy lints are intentionally allowed for this crate:
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: builder signatures take ownership for chaining
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]

pub mod cipher;
pub mod dialect;
pub mod entity;
pub mod metadata;
pub mod query;
pub mod value;

pub use cipher::{CipherSpec, FieldCipher, KeySize};
pub use dialect::Dialect;
pub use entity::{ColumnDef, ColumnKind, Entity, EntityMeta, EnumDef, Navigation};
pub use query::{Bindings, CompiledQuery, Expr, PredicateCompiler, Query};
pub use value::Value;
