//! Predicate trees.
//!
//! An [`Expr`] is a typed predicate over an entity. Member paths are written
//! relative to the entity the predicate applies to (`"Customer.Name"` on an
//! `Order`), literal values are either inline constants or names captured
//! from the caller's scope and bound through a [`Bindings`] table.
//!
//! Predicates compose with `&`, `|` and `!`:
//!
//! ```
//! use sqlweave_db::query::expr::Expr;
//!
//! let adult = Expr::member("Age").gt(Expr::value(30));
//! let named = Expr::member("Name").starts_with(Expr::value("Al"));
//! let either = adult.clone() | named.clone();
//! let neither = !either;
//! let both = adult & named;
//! # let _ = (neither, both);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops;
use std::str::FromStr;

use sqlweave_core::{WeaveError, WeaveResult};

use crate::value::Value;

/// A dotted member path relative to the predicate's entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberPath {
    segments: Vec<String>,
}

impl MemberPath {
    /// Parses a dotted path such as `"Customer.Address.City"`.
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// All segments of the path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The navigation segments leading to the final property.
    pub fn navigation(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, init)) => init,
            None => &[],
        }
    }

    /// The final property name.
    pub fn property(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Returns `true` for a path with no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl BinaryOp {
    /// The SQL spelling of the operator.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }

    /// Returns `true` for `And` and `Or`.
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// The closed set of supported method calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Collection membership (`IN`) or substring match (`LIKE '%v%'`).
    Contains,
    /// `LIKE 'v%'`
    StartsWith,
    /// `LIKE '%v'`
    EndsWith,
    /// Null-or-empty string test.
    IsNullOrEmpty,
    /// `IS NOT NULL`
    HasValue,
    /// Correlated `EXISTS` over a collection navigation.
    Any,
}

impl Method {
    /// The method name as written in predicate trees.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Contains => "Contains",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::IsNullOrEmpty => "IsNullOrEmpty",
            Self::HasValue => "HasValue",
            Self::Any => "Any",
        }
    }
}

impl FromStr for Method {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Contains" => Ok(Self::Contains),
            "StartsWith" => Ok(Self::StartsWith),
            "EndsWith" => Ok(Self::EndsWith),
            "IsNullOrEmpty" => Ok(Self::IsNullOrEmpty),
            "HasValue" => Ok(Self::HasValue),
            "Any" => Ok(Self::Any),
            other => Err(WeaveError::UnsupportedConstruct(format!(
                "Method '{other}' is not supported"
            ))),
        }
    }
}

/// Ordering and paging modifiers. Only valid at the top level of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// Ascending order by a member.
    OrderBy(MemberPath),
    /// Descending order by a member.
    OrderByDescending(MemberPath),
    /// Rows to skip.
    Skip(u64),
    /// Maximum rows to return.
    Take(u64),
}

/// A node of a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// A type conversion; compiles as its operand.
    Convert(Box<Expr>),
    /// A member path on the predicate's entity.
    Member(MemberPath),
    /// An inline literal.
    Constant(Value),
    /// A value captured from the caller, looked up in [`Bindings`].
    Captured(String),
    /// A method call.
    Call {
        /// The method.
        method: Method,
        /// The instance the method is called on, if any.
        receiver: Option<Box<Expr>>,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// An ordering or paging modifier.
    Modifier(Modifier),
}

impl Expr {
    /// A member reference.
    pub fn member(path: &str) -> Self {
        Self::Member(MemberPath::new(path))
    }

    /// An inline literal.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// A captured value, resolved from [`Bindings`] at compile time.
    pub fn captured(name: impl Into<String>) -> Self {
        Self::Captured(name.into())
    }

    /// A binary node.
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A method call built from its name.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::UnsupportedConstruct`] for unknown method names.
    pub fn call(name: &str, receiver: Option<Self>, args: Vec<Self>) -> WeaveResult<Self> {
        Ok(Self::Call {
            method: name.parse()?,
            receiver: receiver.map(Box::new),
            args,
        })
    }

    fn method(method: Method, receiver: Option<Self>, args: Vec<Self>) -> Self {
        Self::Call {
            method,
            receiver: receiver.map(Box::new),
            args,
        }
    }

    /// `self = rhs`
    #[must_use]
    pub fn equals(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Equal, self, rhs)
    }

    /// `self <> rhs`
    #[must_use]
    pub fn not_equals(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::NotEqual, self, rhs)
    }

    /// `self < rhs`
    #[must_use]
    pub fn lt(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::LessThan, self, rhs)
    }

    /// `self <= rhs`
    #[must_use]
    pub fn lte(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::LessThanOrEqual, self, rhs)
    }

    /// `self > rhs`
    #[must_use]
    pub fn gt(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::GreaterThan, self, rhs)
    }

    /// `self >= rhs`
    #[must_use]
    pub fn gte(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::GreaterThanOrEqual, self, rhs)
    }

    /// Substring match on a string member: `self LIKE '%needle%'`.
    #[must_use]
    pub fn contains(self, needle: Self) -> Self {
        Self::method(Method::Contains, Some(self), vec![needle])
    }

    /// Membership of `member` in the collection value `self`.
    #[must_use]
    pub fn includes(self, member: Self) -> Self {
        Self::method(Method::Contains, Some(self), vec![member])
    }

    /// `self LIKE 'prefix%'`
    #[must_use]
    pub fn starts_with(self, prefix: Self) -> Self {
        Self::method(Method::StartsWith, Some(self), vec![prefix])
    }

    /// `self LIKE '%suffix'`
    #[must_use]
    pub fn ends_with(self, suffix: Self) -> Self {
        Self::method(Method::EndsWith, Some(self), vec![suffix])
    }

    /// `self IS NOT NULL`
    #[must_use]
    pub fn has_value(self) -> Self {
        Self::method(Method::HasValue, Some(self), Vec::new())
    }

    /// True when `member` is NULL or the empty string.
    pub fn is_null_or_empty(member: Self) -> Self {
        Self::method(Method::IsNullOrEmpty, None, vec![member])
    }

    /// Correlated existence test over the collection navigation at `path`,
    /// optionally filtered by a predicate over the collection's entity.
    pub fn any(path: &str, predicate: Option<Self>) -> Self {
        Self::method(
            Method::Any,
            Some(Self::member(path)),
            predicate.into_iter().collect(),
        )
    }

    /// Ascending order by `path`.
    pub fn order_by(path: &str) -> Self {
        Self::Modifier(Modifier::OrderBy(MemberPath::new(path)))
    }

    /// Descending order by `path`.
    pub fn order_by_descending(path: &str) -> Self {
        Self::Modifier(Modifier::OrderByDescending(MemberPath::new(path)))
    }

    /// Skip `n` rows.
    pub const fn skip(n: u64) -> Self {
        Self::Modifier(Modifier::Skip(n))
    }

    /// Return at most `n` rows.
    pub const fn take(n: u64) -> Self {
        Self::Modifier(Modifier::Take(n))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.sql()),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::Convert(inner) => write!(f, "{inner}"),
            Self::Member(path) => write!(f, "{path}"),
            Self::Constant(Value::String(s)) => write!(f, "\"{s}\""),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Captured(name) => write!(f, "@{name}"),
            Self::Call {
                method,
                receiver,
                args,
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "{}(", method.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Modifier(Modifier::OrderBy(path)) => write!(f, "OrderBy({path})"),
            Self::Modifier(Modifier::OrderByDescending(path)) => {
                write!(f, "OrderByDescending({path})")
            }
            Self::Modifier(Modifier::Skip(n)) => write!(f, "Skip({n})"),
            Self::Modifier(Modifier::Take(n)) => write!(f, "Take({n})"),
        }
    }
}

impl ops::BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::binary(BinaryOp::And, self, rhs)
    }
}

impl ops::BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::binary(BinaryOp::Or, self, rhs)
    }
}

impl ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

/// Values captured from the caller's scope, by name.
///
/// Captured values are evaluated eagerly by the caller; the compiler only
/// looks them up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`, replacing any previous binding.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style [`bind`](Self::bind).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Looks up a captured value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Looks up a captured value that must be bound.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::UnboundValue`] if `name` is not bound.
    pub fn resolve(&self, name: &str) -> WeaveResult<&Value> {
        self.get(name).ok_or_else(|| {
            WeaveError::UnboundValue(format!("Captured value '{name}' is not bound"))
        })
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
