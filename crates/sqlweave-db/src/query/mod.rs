//! Predicate trees, compilation, and the fluent query builder.
//!
//! - [`expr`] - Predicate tree nodes and captured-value bindings
//! - [`token`] - Token buffer resolving literals against column context
//! - [`compiler`] - Predicate compiler and compiled statements
//! - [`queryset`] - Fluent query builder over an entity type

pub mod compiler;
pub mod expr;
pub mod queryset;
pub mod token;

pub use compiler::{
    AliasGenerator, CompiledQuery, JoinClause, JoinType, OrderBy, PagingSpec, PredicateCompiler,
};
pub use expr::{BinaryOp, Bindings, Expr, MemberPath, Method, Modifier};
pub use queryset::Query;
pub use token::{ColumnRef, Token, TokenBuffer, Wildcard};
