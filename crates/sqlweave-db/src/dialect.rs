//! SQL dialects and their syntax differences.
//!
//! The compiler writes identifiers in bracket style (`[Column]`) and lets the
//! [`Dialect`] normalize them, spell boolean literals, and render paging.

use std::fmt;
use std::str::FromStr;

use sqlweave_core::WeaveError;

/// The target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Dialect {
    /// Microsoft SQL Server.
    Mssql,
    /// PostgreSQL.
    PostgreSql,
    /// SQLite and compatible engines.
    Sqlite,
}

impl Dialect {
    /// Returns the lowercase configuration name of the dialect.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mssql => "mssql",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the boolean literal spelling for this dialect.
    pub const fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Self::PostgreSql, true) => "true",
            (Self::PostgreSql, false) => "false",
            (_, true) => "1",
            (_, false) => "0",
        }
    }

    /// Quotes a single identifier.
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Self::PostgreSql => format!("\"{name}\""),
            Self::Mssql | Self::Sqlite => format!("[{name}]"),
        }
    }

    /// Renders a table name.
    ///
    /// Plain names are emitted as written; bracket-quoted names
    /// (`[dbo].[Users]`) are normalized to the dialect's quoting.
    pub fn table_name(self, table: &str) -> String {
        match self {
            Self::PostgreSql if table.contains('[') => table.replace(['[', ']'], "\""),
            _ => table.to_string(),
        }
    }

    /// Qualifies a column with a table name or join alias.
    pub fn qualified_column(self, qualifier: &str, column: &str) -> String {
        format!("{qualifier}.{}", self.quote_ident(column))
    }

    /// Renders a quoted string literal, doubling embedded quotes.
    pub fn string_literal(self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Renders the paging clause (without a trailing semicolon).
    ///
    /// `take` of `None` means unbounded.
    pub fn paging_clause(self, skip: u64, take: Option<u64>) -> String {
        match (self, take) {
            (Self::Mssql | Self::PostgreSql, Some(take)) => {
                format!("OFFSET {skip} ROWS FETCH NEXT {take} ROWS ONLY")
            }
            (Self::Mssql | Self::PostgreSql, None) => format!("OFFSET {skip} ROWS"),
            (Self::Sqlite, Some(take)) => format!("LIMIT {skip},{take}"),
            (Self::Sqlite, None) => format!("LIMIT {skip},-1"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mssql" | "sqlserver" | "tsql" => Ok(Self::Mssql),
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSql),
            "sqlite" | "sqllight" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(WeaveError::ConfigurationError(format!(
                "Unknown dialect '{other}'"
            ))),
        }
    }
}
