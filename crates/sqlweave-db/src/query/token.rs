//! Token buffer for SQL under construction.
//!
//! The compiler does not know how to spell a literal until it knows which
//! column the literal is compared with: an enum ordinal may have to become
//! the enum's declared name, a string may have to be encrypted, and `true`
//! may be `1` or `true` depending on the dialect. Literals are therefore
//! pushed as [`Token::Deferred`] and resolved later.
//!
//! Resolution happens in three places:
//!
//! - [`TokenBuffer::bind_span`] after a comparison or method call closes,
//!   binding the span's deferred literals to its first column;
//! - [`TokenBuffer::collapse_booleans`] after a binary node closes;
//! - [`TokenBuffer::finish`] when the predicate is rendered.

use sqlweave_core::{WeaveError, WeaveResult};

use crate::cipher::{CipherSpec, FieldCipher};
use crate::dialect::Dialect;
use crate::entity::ColumnKind;
use crate::metadata;
use crate::value::{Value, ValueClass};

/// A column reference with everything needed to bind literals to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Table name (already dialect-rendered) or join alias.
    pub qualifier: String,
    /// Column name.
    pub column: String,
    /// Storage kind of the column.
    pub kind: ColumnKind,
    /// Enum registry key (`Type.Property`) when the column stores enum names.
    pub stringify: Option<String>,
    /// Encryption annotation.
    pub cipher: Option<CipherSpec>,
}

impl ColumnRef {
    /// Renders `qualifier.[column]` for `dialect`.
    pub fn render(&self, dialect: Dialect) -> String {
        dialect.qualified_column(&self.qualifier, &self.column)
    }

    /// Whether literals compared with this column are text.
    pub const fn is_textual(&self) -> bool {
        matches!(self.kind, ColumnKind::String) || self.stringify.is_some()
    }
}

/// `LIKE` wildcard placement around a string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wildcard {
    /// No wildcard.
    #[default]
    None,
    /// `%value`
    Leading,
    /// `value%`
    Trailing,
    /// `%value%`
    Both,
}

impl Wildcard {
    /// Wraps `text` in `%` as requested.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::None => text.to_string(),
            Self::Leading => format!("%{text}"),
            Self::Trailing => format!("{text}%"),
            Self::Both => format!("%{text}%"),
        }
    }
}

/// One piece of SQL under construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Resolved SQL text.
    Sql(String),
    /// A column, rendered at finish time.
    Column(ColumnRef),
    /// A literal waiting for its column context.
    ///
    /// `hint` is the kind of the column the literal was bound to, or `None`
    /// while unbound.
    Deferred {
        /// The literal.
        value: Value,
        /// Wildcards for `LIKE` operands.
        wildcard: Wildcard,
        /// Kind of the bound column.
        hint: Option<ColumnKind>,
    },
    /// An enum literal waiting to be replaced by its declared name.
    Stringify {
        /// The enum value (ordinal or name).
        value: Value,
        /// Wildcards for `LIKE` operands.
        wildcard: Wildcard,
        /// Enum registry key.
        enum_key: String,
    },
    /// A literal waiting to be encrypted.
    Cipher {
        /// The plaintext value.
        value: Value,
        /// Wildcards, kept outside the encrypted text.
        wildcard: Wildcard,
        /// Cipher annotation of the bound column.
        spec: CipherSpec,
    },
    /// A boolean marker; collapses to `= <true>` or, inverted, `= <false>`.
    Bool {
        /// Whether the marker was produced under `NOT`.
        invert: bool,
    },
}

/// An append-only sequence of [`Token`]s.
#[derive(Debug, Clone, Default)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
}

impl TokenBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current position, to be passed to the span operations.
    pub fn mark(&self) -> usize {
        self.tokens.len()
    }

    /// Returns the tokens pushed so far.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Appends resolved SQL text.
    pub fn push_sql(&mut self, sql: impl Into<String>) {
        self.tokens.push(Token::Sql(sql.into()));
    }

    /// Appends a column reference.
    pub fn push_column(&mut self, column: ColumnRef) {
        self.tokens.push(Token::Column(column));
    }

    /// Appends an unbound literal.
    pub fn push_value(&mut self, value: Value, wildcard: Wildcard) {
        self.tokens.push(Token::Deferred {
            value,
            wildcard,
            hint: None,
        });
    }

    /// Appends a boolean marker.
    pub fn push_bool(&mut self, invert: bool) {
        self.tokens.push(Token::Bool { invert });
    }

    /// Binds every unbound literal since `start` to the first column in the
    /// span, then resolves the enum and cipher markers this produces.
    ///
    /// A span without a column leaves its literals unbound; they are
    /// classified by their own type at finish.
    pub fn bind_span(&mut self, start: usize) -> WeaveResult<()> {
        let Some(column) = self.tokens[start..].iter().find_map(|t| match t {
            Token::Column(c) => Some(c.clone()),
            _ => None,
        }) else {
            return Ok(());
        };

        for token in &mut self.tokens[start..] {
            if let Token::Deferred {
                value,
                wildcard,
                hint: None,
            } = token
            {
                let value = std::mem::replace(value, Value::Null);
                let wildcard = *wildcard;
                // LIKE patterns on an enum-name column are partial names and
                // bind as plain text.
                *token = match (&column.stringify, &column.cipher) {
                    (Some(enum_key), _) if wildcard == Wildcard::None => Token::Stringify {
                        value,
                        wildcard,
                        enum_key: enum_key.clone(),
                    },
                    (_, Some(spec)) => Token::Cipher {
                        value,
                        wildcard,
                        spec: spec.clone(),
                    },
                    (Some(_), None) => Token::Deferred {
                        value,
                        wildcard,
                        hint: Some(ColumnKind::String),
                    },
                    (None, None) => Token::Deferred {
                        value,
                        wildcard,
                        hint: Some(column.kind),
                    },
                };
            }
        }

        self.resolve_markers(start, &column)
    }

    fn resolve_markers(&mut self, start: usize, column: &ColumnRef) -> WeaveResult<()> {
        for token in &mut self.tokens[start..] {
            if let Token::Stringify {
                value,
                wildcard,
                enum_key,
            } = token
            {
                let value = stringify_value(value, enum_key)?;
                let wildcard = *wildcard;
                *token = match &column.cipher {
                    Some(spec) => Token::Cipher {
                        value,
                        wildcard,
                        spec: spec.clone(),
                    },
                    None => Token::Deferred {
                        value,
                        wildcard,
                        hint: Some(ColumnKind::String),
                    },
                };
            }
            if let Token::Cipher {
                value,
                wildcard,
                spec,
            } = token
            {
                let cipher = FieldCipher::from_spec(spec)?;
                let value = encrypt_value(&cipher, value, *wildcard)?;
                *token = Token::Deferred {
                    value,
                    wildcard: Wildcard::None,
                    hint: Some(ColumnKind::String),
                };
            }
        }
        Ok(())
    }

    /// Collapses every boolean marker since `start` into `= <literal>`.
    pub fn collapse_booleans(&mut self, start: usize, dialect: Dialect) {
        for token in &mut self.tokens[start..] {
            if let Token::Bool { invert } = token {
                *token = Token::Sql(format!(" = {}", dialect.bool_literal(!*invert)));
            }
        }
    }

    /// Renders the buffer as SQL text.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::UnresolvedToken`] if an enum or cipher marker
    /// was never resolved.
    pub fn finish(self, dialect: Dialect) -> WeaveResult<String> {
        let mut sql = String::new();
        for token in &self.tokens {
            match token {
                Token::Sql(text) => sql.push_str(text),
                Token::Column(column) => sql.push_str(&column.render(dialect)),
                Token::Deferred {
                    value,
                    wildcard,
                    hint,
                } => sql.push_str(&render_literal(value, *wildcard, *hint, dialect)),
                Token::Stringify { enum_key, .. } => {
                    return Err(WeaveError::UnresolvedToken(format!(
                        "enum value for '{enum_key}' was never resolved"
                    )));
                }
                Token::Cipher { .. } => {
                    return Err(WeaveError::UnresolvedToken(
                        "encrypted value was never resolved".to_string(),
                    ));
                }
                Token::Bool { invert } => {
                    sql.push_str(" = ");
                    sql.push_str(dialect.bool_literal(!*invert));
                }
            }
        }
        Ok(sql)
    }
}

fn stringify_value(value: &Value, enum_key: &str) -> WeaveResult<Value> {
    let def = metadata::enum_type(enum_key).ok_or_else(|| {
        WeaveError::UnresolvedToken(format!("no enum type registered for '{enum_key}'"))
    })?;
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(ordinal) => def.name_of(*ordinal).map(Value::from).ok_or_else(|| {
            WeaveError::UnresolvedToken(format!(
                "{ordinal} is not a value of enum '{}'",
                def.name
            ))
        }),
        Value::String(name) if def.has_name(name) => Ok(value.clone()),
        Value::List(items) => items
            .iter()
            .map(|item| stringify_value(item, enum_key))
            .collect::<WeaveResult<Vec<_>>>()
            .map(Value::List),
        other => Err(WeaveError::UnresolvedToken(format!(
            "'{other}' is not a value of enum '{}'",
            def.name
        ))),
    }
}

fn encrypt_value(cipher: &FieldCipher, value: &Value, wildcard: Wildcard) -> WeaveResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(items) => items
            .iter()
            .map(|item| encrypt_value(cipher, item, wildcard))
            .collect::<WeaveResult<Vec<_>>>()
            .map(Value::List),
        other => {
            let encrypted = cipher.encrypt_str(&other.to_string())?;
            Ok(Value::String(wildcard.apply(&encrypted)))
        }
    }
}

fn render_literal(
    value: &Value,
    wildcard: Wildcard,
    hint: Option<ColumnKind>,
    dialect: Dialect,
) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => dialect.bool_literal(*b).to_string(),
        Value::List(items) => items
            .iter()
            .map(|item| render_literal(item, wildcard, hint, dialect))
            .collect::<Vec<_>>()
            .join(","),
        other => {
            let class = hint.map_or_else(|| other.class(), ColumnKind::literal_class);
            let quoted = matches!(
                class,
                ValueClass::String | ValueClass::Date | ValueClass::Guid
            ) || matches!(
                other.class(),
                ValueClass::String | ValueClass::Date | ValueClass::Guid
            );
            if quoted {
                dialect.string_literal(&wildcard.apply(&other.to_string()))
            } else {
                other.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KeySize;
    use crate::entity::EnumDef;

    static COLOR: EnumDef = EnumDef {
        name: "Color",
        variants: &[(0, "Red"), (1, "Green")],
    };

    fn column(kind: ColumnKind) -> ColumnRef {
        ColumnRef {
            qualifier: "Person".to_string(),
            column: "Age".to_string(),
            kind,
            stringify: None,
            cipher: None,
        }
    }

    #[test]
    fn test_finish_renders_columns_and_literals() {
        let mut buf = TokenBuffer::new();
        let start = buf.mark();
        buf.push_sql("(");
        buf.push_column(column(ColumnKind::Int));
        buf.push_sql(" > ");
        buf.push_value(Value::Int(30), Wildcard::None);
        buf.push_sql(")");
        buf.bind_span(start).unwrap();
        assert_eq!(buf.finish(Dialect::Mssql).unwrap(), "(Person.[Age] > 30)");
    }

    #[test]
    fn test_string_literal_quoting_and_wildcards() {
        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::String));
        buf.push_sql(" LIKE ");
        buf.push_value(Value::from("O'Neil"), Wildcard::Trailing);
        buf.bind_span(0).unwrap();
        assert_eq!(
            buf.finish(Dialect::Sqlite).unwrap(),
            "Person.[Age] LIKE 'O''Neil%'"
        );
    }

    #[test]
    fn test_number_bound_to_text_column_is_quoted() {
        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::String));
        buf.push_sql(" = ");
        buf.push_value(Value::Int(5), Wildcard::None);
        buf.bind_span(0).unwrap();
        assert_eq!(buf.finish(Dialect::Mssql).unwrap(), "Person.[Age] = '5'");
    }

    #[test]
    fn test_unbound_literals_use_own_class() {
        let mut buf = TokenBuffer::new();
        buf.push_value(Value::from("x"), Wildcard::None);
        buf.push_sql(" ");
        buf.push_value(Value::Float(2.5), Wildcard::None);
        buf.push_sql(" ");
        buf.push_value(Value::Null, Wildcard::None);
        buf.push_sql(" ");
        buf.push_value(Value::Uuid(uuid::Uuid::nil()), Wildcard::None);
        assert_eq!(
            buf.finish(Dialect::Mssql).unwrap(),
            "'x' 2.5 NULL '00000000-0000-0000-0000-000000000000'"
        );
    }

    #[test]
    fn test_list_renders_comma_joined() {
        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::Int));
        buf.push_value(Value::from(vec![1, 2, 3]), Wildcard::None);
        buf.bind_span(0).unwrap();
        assert_eq!(buf.finish(Dialect::Mssql).unwrap(), "Person.[Age]1,2,3");
    }

    #[test]
    fn test_collapse_booleans_per_dialect() {
        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::Bool));
        buf.push_bool(false);
        buf.collapse_booleans(0, Dialect::Mssql);
        assert_eq!(buf.tokens()[1], Token::Sql(" = 1".to_string()));

        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::Bool));
        buf.push_bool(true);
        assert_eq!(buf.finish(Dialect::PostgreSql).unwrap(), "Person.\"Age\" = false");
    }

    #[test]
    fn test_bool_value_uses_dialect_literal() {
        let mut buf = TokenBuffer::new();
        buf.push_column(column(ColumnKind::Bool));
        buf.push_sql(" = ");
        buf.push_value(Value::Bool(true), Wildcard::None);
        buf.bind_span(0).unwrap();
        assert_eq!(buf.finish(Dialect::PostgreSql).unwrap(), "Person.\"Age\" = true");
    }

    #[test]
    fn test_stringify_resolves_enum_name() {
        metadata::register_enum("TokenTest.Color", &COLOR);
        let mut col = column(ColumnKind::Enum);
        col.stringify = Some("TokenTest.Color".to_string());

        let mut buf = TokenBuffer::new();
        buf.push_column(col);
        buf.push_sql(" = ");
        buf.push_value(Value::Int(1), Wildcard::None);
        buf.bind_span(0).unwrap();
        assert_eq!(buf.finish(Dialect::Mssql).unwrap(), "Person.[Age] = 'Green'");
    }

    #[test]
    fn test_stringify_unknown_ordinal_is_error() {
        metadata::register_enum("TokenTest.Color", &COLOR);
        let mut col = column(ColumnKind::Enum);
        col.stringify = Some("TokenTest.Color".to_string());

        let mut buf = TokenBuffer::new();
        buf.push_column(col);
        buf.push_value(Value::Int(7), Wildcard::None);
        assert!(matches!(
            buf.bind_span(0),
            Err(WeaveError::UnresolvedToken(_))
        ));
    }

    #[test]
    fn test_like_pattern_on_enum_column_is_plain_text() {
        metadata::register_enum("TokenTest.Color", &COLOR);
        let mut col = column(ColumnKind::Enum);
        col.stringify = Some("TokenTest.Color".to_string());

        let mut buf = TokenBuffer::new();
        buf.push_column(col);
        buf.push_sql(" LIKE ");
        buf.push_value(Value::from("Gr"), Wildcard::Trailing);
        buf.bind_span(0).unwrap();
        assert_eq!(buf.finish(Dialect::Mssql).unwrap(), "Person.[Age] LIKE 'Gr%'");
    }

    #[test]
    fn test_like_pattern_on_encrypted_enum_column_is_encrypted() {
        metadata::register_enum("TokenTest.Color", &COLOR);
        let spec = CipherSpec::new("token-test-key", KeySize::Key128);
        let mut col = column(ColumnKind::Enum);
        col.stringify = Some("TokenTest.Color".to_string());
        col.cipher = Some(spec.clone());

        let mut buf = TokenBuffer::new();
        buf.push_column(col);
        buf.push_sql(" LIKE ");
        buf.push_value(Value::from("Gr"), Wildcard::Leading);
        buf.bind_span(0).unwrap();

        let expected = FieldCipher::from_spec(&spec)
            .unwrap()
            .encrypt_str("Gr")
            .unwrap();
        assert_eq!(
            buf.finish(Dialect::Mssql).unwrap(),
            format!("Person.[Age] LIKE '%{expected}'")
        );
    }

    #[test]
    fn test_cipher_literal_is_encrypted_with_wildcards_outside() {
        let spec = CipherSpec::new("token-test-key", KeySize::Key128);
        let mut col = column(ColumnKind::String);
        col.cipher = Some(spec.clone());

        let mut buf = TokenBuffer::new();
        buf.push_column(col);
        buf.push_sql(" LIKE ");
        buf.push_value(Value::from("secret"), Wildcard::Both);
        buf.bind_span(0).unwrap();
        let sql = buf.finish(Dialect::Mssql).unwrap();

        let expected = FieldCipher::from_spec(&spec)
            .unwrap()
            .encrypt_str("secret")
            .unwrap();
        assert_eq!(sql, format!("Person.[Age] LIKE '%{expected}%'"));
    }

    #[test]
    fn test_unresolved_marker_is_error() {
        let mut buf = TokenBuffer::new();
        buf.tokens.push(Token::Cipher {
            value: Value::from("x"),
            wildcard: Wildcard::None,
            spec: CipherSpec::new("k", KeySize::Key128),
        });
        assert!(matches!(
            buf.finish(Dialect::Mssql),
            Err(WeaveError::UnresolvedToken(_))
        ));
    }

    #[test]
    fn test_bind_span_without_column_leaves_literals_unbound() {
        let mut buf = TokenBuffer::new();
        buf.push_value(Value::Int(1), Wildcard::None);
        buf.bind_span(0).unwrap();
        assert!(matches!(buf.tokens()[0], Token::Deferred { hint: None, .. }));
    }
}
