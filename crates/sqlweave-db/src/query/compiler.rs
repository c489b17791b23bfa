//! Predicate compiler.
//!
//! The [`PredicateCompiler`] walks predicate trees over one root entity and
//! produces a [`CompiledQuery`]: WHERE fragments, the JOINs needed to reach
//! navigation properties, ordering and paging. Literal spelling is delegated
//! to the [`TokenBuffer`], which binds literals to the column they are
//! compared with.
//!
//! Each top-level predicate yields exactly one WHERE fragment; fragments are
//! combined with `AND`. A navigation path is joined at most once per
//! compilation and every later reference reuses its alias.
//!
//! # Examples
//!
//! ```
//! use std::sync::LazyLock;
//! use sqlweave_db::dialect::Dialect;
//! use sqlweave_db::entity::{ColumnDef, ColumnKind, Entity, EntityMeta};
//! use sqlweave_db::query::compiler::PredicateCompiler;
//! use sqlweave_db::query::expr::{Bindings, Expr};
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
//! let mut compiler = PredicateCompiler::new(Person::meta(), Dialect::Mssql);
//! compiler
//!     .translate(&Expr::member("Age").gt(Expr::value(30)), &Bindings::new())
//!     .unwrap();
//! let query = compiler.finish().unwrap();
//! assert_eq!(query.where_sql().unwrap(), "(Person.[Age] > 30)");
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlweave_core::logging::compile_span;
use sqlweave_core::{WeaveError, WeaveResult};

use super::expr::{BinaryOp, Bindings, Expr, MemberPath, Method, Modifier};
use super::token::{ColumnRef, TokenBuffer, Wildcard};
use crate::dialect::Dialect;
use crate::entity::{ColumnKind, EntityMeta};
use crate::metadata;
use crate::value::Value;

const ALIAS_LEN: usize = 4;
const ALIAS_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

// Four-letter words an alias must not collide with.
const RESERVED_ALIASES: &[&str] = &[
    "both", "case", "cast", "desc", "drop", "each", "else", "exec", "from", "full",
    "goto", "into", "join", "kill", "left", "like", "load", "next", "null", "only", "open",
    "over", "read", "rows", "some", "then", "true", "user", "view", "when", "with",
];

/// Generates join aliases that are unique within one compilation.
#[derive(Debug)]
pub struct AliasGenerator {
    rng: StdRng,
    issued: HashSet<String>,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator {
    /// A generator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            issued: HashSet::new(),
        }
    }

    /// A deterministic generator, for reproducible SQL in tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            issued: HashSet::new(),
        }
    }

    /// Returns a fresh alias of four random letters.
    pub fn next_alias(&mut self) -> String {
        loop {
            let alias: String = (0..ALIAS_LEN)
                .map(|_| char::from(ALIAS_CHARS[self.rng.gen_range(0..ALIAS_CHARS.len())]))
                .collect();
            if !RESERVED_ALIASES.contains(&alias.as_str()) && self.issued.insert(alias.clone()) {
                return alias;
            }
        }
    }

    /// Number of aliases issued so far.
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}

/// SQL JOIN types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
}

impl JoinType {
    /// Returns the SQL keyword for this join type.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A JOIN synthesized for a navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    /// Navigation path from the scope root, segments joined with `.`.
    pub path: String,
    /// The alias of the joined table.
    pub alias: String,
    /// The join type.
    pub join_type: JoinType,
    /// The complete JOIN clause.
    pub sql: String,
}

/// A rendered ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The rendered column.
    pub column: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Creates a descending order.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Renders `column ASC` or `column DESC`.
    pub fn sql(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("{} {dir}", self.column)
    }
}

/// Ordering and paging of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingSpec {
    /// Rows to skip.
    pub skip: u64,
    /// Maximum rows; `None` is unbounded.
    pub take: Option<u64>,
    /// Ordering; defaults to the primary key ascending.
    pub order_by: OrderBy,
}

/// The SQL produced for one query over a root entity.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    dialect: Dialect,
    table: String,
    columns: Arc<[String]>,
    primary_key: String,
    joins: Vec<JoinClause>,
    fragments: Vec<String>,
    paging: PagingSpec,
}

impl CompiledQuery {
    /// The dialect the query was compiled for.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The JOINs required by the predicates and ordering.
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// The WHERE fragments, one per predicate.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// The paging and ordering.
    pub const fn paging(&self) -> &PagingSpec {
        &self.paging
    }

    /// The combined WHERE condition, if any predicate was given.
    pub fn where_sql(&self) -> Option<String> {
        (!self.fragments.is_empty()).then(|| self.fragments.join(" AND "))
    }

    fn from_lines(&self, head: String) -> Vec<String> {
        let mut lines = vec![head];
        lines.extend(self.joins.iter().map(|j| j.sql.clone()));
        if let Some(condition) = self.where_sql() {
            lines.push(format!("WHERE {condition}"));
        }
        lines
    }

    fn select_lines(&self) -> Vec<String> {
        let columns = self.columns.join(", ");
        let mut lines = self.from_lines(format!("SELECT {columns} FROM {}", self.table));
        lines.push(format!("GROUP BY {columns}"));
        lines.push(format!("ORDER BY {}", self.paging.order_by.sql()));
        lines
    }

    /// The full SELECT statement with ordering and paging.
    pub fn select_sql(&self) -> String {
        let mut lines = self.select_lines();
        lines.push(self.dialect.paging_clause(self.paging.skip, self.paging.take));
        format!("{};", lines.join("\n"))
    }

    /// A statement returning only the first row.
    pub fn first_sql(&self) -> String {
        match self.dialect {
            Dialect::Mssql => format!(
                "SELECT TOP(1) * FROM ({}) AS [RESULT]",
                self.select_sql().trim_end_matches(';')
            ),
            Dialect::PostgreSql | Dialect::Sqlite => {
                format!("{}\nLIMIT 1", self.select_lines().join("\n"))
            }
        }
    }

    /// A statement counting distinct matching rows of the root entity.
    pub fn count_sql(&self) -> String {
        self.from_lines(format!(
            "SELECT COUNT(DISTINCT {}) AS items FROM {}",
            self.primary_key, self.table
        ))
        .join("\n")
    }

    /// An `EXISTS (...)` expression testing for any matching row.
    pub fn exists_sql(&self) -> String {
        format!(
            "EXISTS ({})",
            self.from_lines(format!("SELECT 1 FROM {}", self.table))
                .join("\n")
        )
    }
}

/// Compiles predicate trees over one root entity.
///
/// A compiler is single-use: translate every predicate and modifier, then
/// call [`finish`](Self::finish).
#[derive(Debug)]
pub struct PredicateCompiler {
    root: &'static EntityMeta,
    dialect: Dialect,
    aliases: AliasGenerator,
    joins: Vec<JoinClause>,
    fragments: Vec<String>,
    order_by: Option<OrderBy>,
    skip: Option<u64>,
    take: Option<u64>,
}

impl PredicateCompiler {
    /// Creates a compiler with a randomly seeded alias generator.
    pub fn new(root: &'static EntityMeta, dialect: Dialect) -> Self {
        Self::with_aliases(root, dialect, AliasGenerator::new())
    }

    /// Creates a compiler using the given alias generator.
    pub fn with_aliases(
        root: &'static EntityMeta,
        dialect: Dialect,
        aliases: AliasGenerator,
    ) -> Self {
        Self {
            root,
            dialect,
            aliases,
            joins: Vec::new(),
            fragments: Vec::new(),
            order_by: None,
            skip: None,
            take: None,
        }
    }

    /// The JOINs synthesized so far.
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// Translates one top-level predicate or modifier.
    ///
    /// On error nothing is recorded for `expr`.
    ///
    /// # Errors
    ///
    /// - [`WeaveError::UnsupportedConstruct`] for nodes outside the supported set
    /// - [`WeaveError::MetadataError`] for unknown members or missing keys
    /// - [`WeaveError::UnboundValue`] for captured values missing from `bindings`
    /// - [`WeaveError::CipherError`] / [`WeaveError::ConfigurationError`] when
    ///   a literal bound to an encrypted column cannot be encrypted
    pub fn translate(&mut self, expr: &Expr, bindings: &Bindings) -> WeaveResult<()> {
        let span = compile_span(self.root.type_name, self.dialect.name());
        let _guard = span.enter();

        let joins_before = self.joins.len();
        let result = match expr {
            Expr::Modifier(modifier) => self.apply_modifier(modifier),
            _ => {
                let mut scope = Scope {
                    root: self.root,
                    qualifier: self.dialect.table_name(&self.root.table),
                    dialect: self.dialect,
                    aliases: &mut self.aliases,
                    joins: &mut self.joins,
                    bindings,
                    buf: TokenBuffer::new(),
                };
                match scope.predicate(expr) {
                    Ok(()) => scope.buf.finish(self.dialect).map(|sql| {
                        let fragment = if is_parenthesized(&sql) {
                            sql
                        } else {
                            format!("({sql})")
                        };
                        tracing::debug!(fragment = %fragment, "compiled predicate");
                        self.fragments.push(fragment);
                    }),
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = &result {
            tracing::debug!(error = %e, expr = %expr, "predicate rejected");
            self.joins.truncate(joins_before);
        }
        result
    }

    fn apply_modifier(&mut self, modifier: &Modifier) -> WeaveResult<()> {
        match modifier {
            Modifier::OrderBy(path) | Modifier::OrderByDescending(path) => {
                if self.order_by.is_some() {
                    tracing::debug!(path = %path, "ordering already set; ignoring");
                    return Ok(());
                }
                let bindings = Bindings::new();
                let mut scope = Scope {
                    root: self.root,
                    qualifier: self.dialect.table_name(&self.root.table),
                    dialect: self.dialect,
                    aliases: &mut self.aliases,
                    joins: &mut self.joins,
                    bindings: &bindings,
                    buf: TokenBuffer::new(),
                };
                let column = scope.column(path)?.render(self.dialect);
                self.order_by = Some(OrderBy {
                    column,
                    descending: matches!(modifier, Modifier::OrderByDescending(_)),
                });
            }
            Modifier::Skip(n) => {
                if self.skip.is_some() {
                    tracing::debug!(skip = n, "skip already set; ignoring");
                } else {
                    self.skip = Some(*n);
                }
            }
            Modifier::Take(n) => {
                if self.take.is_some() {
                    tracing::debug!(take = n, "take already set; ignoring");
                } else {
                    self.take = Some(*n);
                }
            }
        }
        Ok(())
    }

    /// Produces the compiled query.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::MetadataError`] if the root entity has no
    /// primary key.
    pub fn finish(self) -> WeaveResult<CompiledQuery> {
        let table = self.dialect.table_name(&self.root.table);
        let primary_key = self
            .dialect
            .qualified_column(&table, &self.root.primary_key()?.column);
        let order_by = self
            .order_by
            .unwrap_or_else(|| OrderBy::asc(primary_key.clone()));
        Ok(CompiledQuery {
            dialect: self.dialect,
            columns: metadata::columns(self.root, self.dialect),
            table,
            primary_key,
            joins: self.joins,
            fragments: self.fragments,
            paging: PagingSpec {
                skip: self.skip.unwrap_or(0),
                take: self.take,
                order_by,
            },
        })
    }
}

/// Translation state for one predicate over one root entity.
///
/// `Any` subqueries get a nested scope with their own joins and buffer but
/// the alias generator of the outer compilation. Inside a subquery the root
/// is qualified by its own alias, never by its table name.
struct Scope<'c> {
    root: &'static EntityMeta,
    /// Qualifier of the root entity: its table name, or an alias in a subquery.
    qualifier: String,
    dialect: Dialect,
    aliases: &'c mut AliasGenerator,
    joins: &'c mut Vec<JoinClause>,
    bindings: &'c Bindings,
    buf: TokenBuffer,
}

impl Scope<'_> {
    /// Walks `navigation` from the root, joining each step not yet joined.
    /// Returns the entity reached and its qualifier.
    fn resolve_owner(
        &mut self,
        navigation: &[String],
    ) -> WeaveResult<(&'static EntityMeta, String)> {
        let mut owner = self.root;
        let mut qualifier = self.qualifier.clone();

        for (i, segment) in navigation.iter().enumerate() {
            let nav = owner.navigation_for(segment).ok_or_else(|| {
                WeaveError::MetadataError(format!(
                    "Entity '{}' has no navigation '{segment}'",
                    owner.type_name
                ))
            })?;
            if nav.many {
                return Err(WeaveError::UnsupportedConstruct(format!(
                    "Collection navigation '{segment}' can only be queried through Any"
                )));
            }
            let target = (nav.target)();
            let path = navigation[..=i].join(".");

            let existing = self
                .joins
                .iter()
                .find(|j| j.path == path)
                .map(|j| j.alias.clone());
            qualifier = match existing {
                Some(alias) => alias,
                None => {
                    let join = self.left_join(owner, &qualifier, target, path)?;
                    let alias = join.alias.clone();
                    self.joins.push(join);
                    alias
                }
            };
            owner = target;
        }
        Ok((owner, qualifier))
    }

    fn left_join(
        &mut self,
        owner: &EntityMeta,
        owner_qualifier: &str,
        target: &EntityMeta,
        path: String,
    ) -> WeaveResult<JoinClause> {
        let d = self.dialect;
        let (target_column, owner_column) = if let Some(fk) = owner.foreign_key_to(target) {
            (target.primary_key()?.column.as_str(), fk.column.as_str())
        } else if let Some(fk) = target.foreign_key_to(owner) {
            (fk.column.as_str(), owner.primary_key()?.column.as_str())
        } else {
            return Err(WeaveError::MetadataError(format!(
                "No foreign key between '{}' and '{}' for navigation '{path}'",
                owner.type_name, target.type_name
            )));
        };

        let alias = self.aliases.next_alias();
        let sql = format!(
            "{} {} {alias} ON {} = {}",
            JoinType::Left.sql_keyword(),
            d.table_name(&target.table),
            d.qualified_column(&alias, target_column),
            d.qualified_column(owner_qualifier, owner_column),
        );
        tracing::trace!(path = %path, alias = %alias, "synthesized join");
        Ok(JoinClause {
            path,
            alias,
            join_type: JoinType::Left,
            sql,
        })
    }

    fn column(&mut self, path: &MemberPath) -> WeaveResult<ColumnRef> {
        if path.is_empty() {
            return Err(WeaveError::UnsupportedConstruct(
                "Empty member path".to_string(),
            ));
        }
        let (owner, qualifier) = self.resolve_owner(path.navigation())?;
        let property = path.property();
        let Some(column) = owner.column_for(property) else {
            return Err(if owner.navigation_for(property).is_some() {
                WeaveError::UnsupportedConstruct(format!(
                    "Navigation '{path}' cannot be used as a value"
                ))
            } else {
                WeaveError::MetadataError(format!(
                    "Entity '{}' has no property '{property}'",
                    owner.type_name
                ))
            });
        };

        let stringify = (column.stringify && metadata::enum_for(owner, property).is_some())
            .then(|| metadata::enum_key(owner, property));
        Ok(ColumnRef {
            qualifier,
            column: column.column.clone(),
            kind: column.kind,
            stringify,
            cipher: column.cipher.clone(),
        })
    }

    fn literal(&self, expr: &Expr) -> WeaveResult<Value> {
        match strip_convert(expr) {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Captured(name) => self.bindings.resolve(name).cloned(),
            other => Err(WeaveError::UnsupportedConstruct(format!(
                "'{other}' is not a value"
            ))),
        }
    }

    fn is_null(&self, expr: &Expr) -> WeaveResult<bool> {
        match strip_convert(expr) {
            Expr::Constant(value) => Ok(value.is_null()),
            Expr::Captured(name) => Ok(self.bindings.resolve(name)?.is_null()),
            _ => Ok(false),
        }
    }

    /// Emits `expr` as a boolean operand followed by a boolean marker, if it
    /// is one. Returns `false` when `expr` is not a boolean operand.
    fn boolean_operand(&mut self, expr: &Expr, invert: bool) -> WeaveResult<bool> {
        match strip_convert(expr) {
            Expr::Member(path) => {
                let column = self.column(path)?;
                if column.kind != ColumnKind::Bool {
                    return Err(WeaveError::UnsupportedConstruct(format!(
                        "Member '{path}' is not boolean and cannot be used as a predicate"
                    )));
                }
                self.buf.push_column(column);
            }
            value @ (Expr::Constant(_) | Expr::Captured(_)) => {
                let literal = self.literal(value)?;
                if literal.as_bool().is_none() {
                    return Err(WeaveError::UnsupportedConstruct(format!(
                        "Value '{value}' is not boolean and cannot be used as a predicate"
                    )));
                }
                self.buf.push_value(literal, Wildcard::None);
            }
            Expr::Call {
                method: Method::IsNullOrEmpty,
                receiver,
                args,
            } => self.null_or_empty(receiver.as_deref(), args)?,
            _ => return Ok(false),
        }
        self.buf.push_bool(invert);
        Ok(true)
    }

    fn predicate(&mut self, expr: &Expr) -> WeaveResult<()> {
        if self.boolean_operand(expr, false)? {
            return Ok(());
        }
        match expr {
            Expr::Binary { op, left, right } if op.is_logical() => {
                let start = self.buf.mark();
                self.buf.push_sql("(");
                self.predicate(left)?;
                self.buf.push_sql(format!(" {} ", op.sql()));
                self.predicate(right)?;
                self.buf.push_sql(")");
                self.buf.collapse_booleans(start, self.dialect);
                Ok(())
            }
            Expr::Binary { op, left, right } => self.comparison(*op, left, right),
            Expr::Not(inner) => {
                if self.boolean_operand(inner, true)? {
                    return Ok(());
                }
                self.buf.push_sql("NOT ");
                self.predicate(inner)
            }
            Expr::Convert(inner) => self.predicate(inner),
            Expr::Call {
                method,
                receiver,
                args,
            } => self.call(*method, receiver.as_deref(), args),
            Expr::Modifier(_) => Err(WeaveError::UnsupportedConstruct(format!(
                "Modifier '{expr}' is only allowed at the top level of a query"
            ))),
            Expr::Member(_) | Expr::Constant(_) | Expr::Captured(_) => Err(
                WeaveError::UnsupportedConstruct(format!("'{expr}' is not a predicate")),
            ),
        }
    }

    fn value(&mut self, expr: &Expr) -> WeaveResult<()> {
        match expr {
            Expr::Member(path) => {
                let column = self.column(path)?;
                self.buf.push_column(column);
                Ok(())
            }
            Expr::Constant(_) | Expr::Captured(_) => {
                let literal = self.literal(expr)?;
                self.buf.push_value(literal, Wildcard::None);
                Ok(())
            }
            Expr::Convert(inner) => self.value(inner),
            Expr::Call {
                method: Method::IsNullOrEmpty,
                receiver,
                args,
            } => self.null_or_empty(receiver.as_deref(), args),
            _ => Err(WeaveError::UnsupportedConstruct(format!(
                "'{expr}' cannot be used as a value"
            ))),
        }
    }

    fn comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> WeaveResult<()> {
        let start = self.buf.mark();
        self.buf.push_sql("(");

        let null_test = match op {
            BinaryOp::Equal => Some(" IS NULL"),
            BinaryOp::NotEqual => Some(" IS NOT NULL"),
            _ => None,
        };
        match null_test {
            Some(test) if self.is_null(right)? => {
                self.value(left)?;
                self.buf.push_sql(test);
            }
            Some(test) if self.is_null(left)? => {
                self.value(right)?;
                self.buf.push_sql(test);
            }
            _ => {
                self.value(left)?;
                self.buf.push_sql(format!(" {} ", op.sql()));
                self.value(right)?;
            }
        }

        self.buf.push_sql(")");
        self.buf.bind_span(start)?;
        self.buf.collapse_booleans(start, self.dialect);
        Ok(())
    }

    fn call(&mut self, method: Method, receiver: Option<&Expr>, args: &[Expr]) -> WeaveResult<()> {
        match method {
            Method::Contains => self.contains(receiver, args),
            Method::StartsWith => {
                let column = self.member_operand(method, receiver)?;
                self.like(method, column, single_arg(method, args)?, Wildcard::Trailing)
            }
            Method::EndsWith => {
                let column = self.member_operand(method, receiver)?;
                self.like(method, column, single_arg(method, args)?, Wildcard::Leading)
            }
            Method::HasValue => {
                if !args.is_empty() {
                    return Err(WeaveError::UnsupportedConstruct(
                        "'HasValue' takes no arguments".to_string(),
                    ));
                }
                let column = self.member_operand(method, receiver)?;
                self.buf.push_sql("(");
                self.buf.push_column(column);
                self.buf.push_sql(" IS NOT NULL)");
                Ok(())
            }
            Method::IsNullOrEmpty => {
                self.null_or_empty(receiver, args)?;
                self.buf.push_bool(false);
                Ok(())
            }
            Method::Any => self.any(receiver, args),
        }
    }

    fn member_operand(
        &mut self,
        method: Method,
        receiver: Option<&Expr>,
    ) -> WeaveResult<ColumnRef> {
        match receiver.map(strip_convert) {
            Some(Expr::Member(path)) => self.column(path),
            _ => Err(WeaveError::UnsupportedConstruct(format!(
                "'{}' must be called on a member",
                method.name()
            ))),
        }
    }

    fn like(
        &mut self,
        method: Method,
        column: ColumnRef,
        pattern: &Expr,
        wildcard: Wildcard,
    ) -> WeaveResult<()> {
        if !column.is_textual() {
            return Err(WeaveError::UnsupportedConstruct(format!(
                "'{}' requires a string member, '{}' is {:?}",
                method.name(),
                column.column,
                column.kind
            )));
        }
        let pattern = self.literal(pattern)?;
        let start = self.buf.mark();
        self.buf.push_sql("(");
        self.buf.push_column(column);
        self.buf.push_sql(" LIKE ");
        self.buf.push_value(pattern, wildcard);
        self.buf.push_sql(")");
        self.buf.bind_span(start)
    }

    fn contains(&mut self, receiver: Option<&Expr>, args: &[Expr]) -> WeaveResult<()> {
        let arg = single_arg(Method::Contains, args)?;
        match receiver.map(strip_convert) {
            Some(Expr::Member(path)) => {
                let column = self.column(path)?;
                self.like(Method::Contains, column, arg, Wildcard::Both)
            }
            Some(collection @ (Expr::Constant(_) | Expr::Captured(_))) => {
                let Value::List(items) = self.literal(collection)? else {
                    return Err(WeaveError::UnsupportedConstruct(format!(
                        "'Contains' receiver '{collection}' is not a collection"
                    )));
                };
                let Expr::Member(path) = strip_convert(arg) else {
                    return Err(WeaveError::UnsupportedConstruct(format!(
                        "'Contains' on a collection expects a member argument, got '{arg}'"
                    )));
                };
                let column = self.column(path)?;
                let textual = column.is_textual();

                let start = self.buf.mark();
                self.buf.push_sql("(");
                self.buf.push_column(column);
                self.buf.push_sql(" IN (");
                if items.is_empty() {
                    let sentinel = self.empty_list_sentinel(textual);
                    self.buf.push_sql(sentinel);
                } else {
                    self.buf.push_value(Value::List(items), Wildcard::None);
                }
                self.buf.push_sql("))");
                self.buf.bind_span(start)
            }
            _ => Err(WeaveError::UnsupportedConstruct(
                "'Contains' must be called on a string member or a collection value".to_string(),
            )),
        }
    }

    /// A value that matches no row, keeping `IN ()` syntactically valid.
    fn empty_list_sentinel(&self, textual: bool) -> String {
        if textual {
            self.dialect.string_literal(&format!(
                "DefaultValueForEmptyArray({})",
                uuid::Uuid::new_v4()
            ))
        } else {
            "-1".to_string()
        }
    }

    fn null_or_empty(&mut self, receiver: Option<&Expr>, args: &[Expr]) -> WeaveResult<()> {
        let target = match (receiver, args) {
            (None, [member]) | (Some(member), []) => member,
            _ => {
                return Err(WeaveError::UnsupportedConstruct(
                    "'IsNullOrEmpty' expects exactly one member".to_string(),
                ));
            }
        };
        let column = self.member_operand(Method::IsNullOrEmpty, Some(target))?;
        let d = self.dialect;
        self.buf.push_sql("(CASE WHEN ");
        self.buf.push_column(column.clone());
        self.buf.push_sql(" IS NULL OR ");
        self.buf.push_column(column);
        self.buf.push_sql(format!(
            " = '' THEN {} ELSE {} END)",
            d.bool_literal(true),
            d.bool_literal(false)
        ));
        Ok(())
    }

    fn any(&mut self, receiver: Option<&Expr>, args: &[Expr]) -> WeaveResult<()> {
        let Some(Expr::Member(path)) = receiver.map(strip_convert) else {
            return Err(WeaveError::UnsupportedConstruct(
                "'Any' must be called on a collection navigation".to_string(),
            ));
        };
        let predicate = match args {
            [] => None,
            [predicate] => Some(predicate),
            _ => {
                return Err(WeaveError::UnsupportedConstruct(
                    "'Any' takes at most one predicate".to_string(),
                ));
            }
        };

        let (owner, outer_qualifier) = self.resolve_owner(path.navigation())?;
        let nav = owner.navigation_for(path.property()).ok_or_else(|| {
            WeaveError::MetadataError(format!(
                "Entity '{}' has no navigation '{}'",
                owner.type_name,
                path.property()
            ))
        })?;
        if !nav.many {
            return Err(WeaveError::UnsupportedConstruct(format!(
                "'Any' requires a collection navigation, '{path}' is single-valued"
            )));
        }
        let child = (nav.target)();
        let fk = child.foreign_key_to(owner).ok_or_else(|| {
            WeaveError::MetadataError(format!(
                "Entity '{}' has no foreign key to '{}' for navigation '{path}'",
                child.type_name, owner.type_name
            ))
        })?;
        let pk = owner.primary_key()?;

        let d = self.dialect;
        let child_table = d.table_name(&child.table);
        let child_alias = self.aliases.next_alias();
        let alias = self.aliases.next_alias();
        let parent_pk = d.qualified_column(&alias, &pk.column);
        let correlation = JoinClause {
            path: path.to_string(),
            sql: format!(
                "{} {} {alias} ON {parent_pk} = {} AND {parent_pk} = {}",
                JoinType::Inner.sql_keyword(),
                d.table_name(&owner.table),
                d.qualified_column(&child_alias, &fk.column),
                d.qualified_column(&outer_qualifier, &pk.column),
            ),
            alias,
            join_type: JoinType::Inner,
        };

        let mut nested_joins = Vec::new();
        let condition = match predicate {
            Some(predicate) => {
                let mut nested = Scope {
                    root: child,
                    qualifier: child_alias.clone(),
                    dialect: d,
                    aliases: &mut *self.aliases,
                    joins: &mut nested_joins,
                    bindings: self.bindings,
                    buf: TokenBuffer::new(),
                };
                nested.predicate(predicate)?;
                Some(nested.buf.finish(d)?)
            }
            None => None,
        };

        let mut sql = format!(
            "EXISTS (SELECT 1 FROM {child_table} {child_alias}\n{}",
            correlation.sql
        );
        for join in &nested_joins {
            sql.push('\n');
            sql.push_str(&join.sql);
        }
        if let Some(condition) = condition {
            sql.push_str("\nWHERE ");
            sql.push_str(&condition);
        }
        sql.push(')');
        tracing::trace!(
            path = %correlation.path,
            alias = %correlation.alias,
            "compiled Any subquery"
        );
        self.buf.push_sql(sql);
        Ok(())
    }
}

fn strip_convert(expr: &Expr) -> &Expr {
    match expr {
        Expr::Convert(inner) => strip_convert(inner),
        other => other,
    }
}

fn single_arg(method: Method, args: &[Expr]) -> WeaveResult<&Expr> {
    match args {
        [arg] => Ok(arg),
        _ => Err(WeaveError::UnsupportedConstruct(format!(
            "'{}' expects exactly one argument, got {}",
            method.name(),
            args.len()
        ))),
    }
}

/// Whether `sql` is wrapped in one pair of parentheses spanning all of it.
fn is_parenthesized(sql: &str) -> bool {
    if !sql.starts_with('(') || !sql.ends_with(')') {
        return false;
    }
    let mut depth = 0_usize;
    let mut in_string = false;
    let last = sql.len() - 1;
    for (i, ch) in sql.char_indices() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
