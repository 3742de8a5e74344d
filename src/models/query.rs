//! Query-related data models.
//!
//! This module defines bind values, per-statement options, the statement
//! description accepted by every execution entry point, and query results.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Shape of each returned row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutFormat {
    /// Each row is an array of column values in select-list order.
    #[default]
    Array,
    /// Each row is an object keyed by column name.
    Object,
}

impl std::str::FromStr for OutFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(format!("unknown out format '{other}', expected array or object")),
        }
    }
}

/// Column categories that can be fetched as strings instead of native JSON values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    /// Integer, floating point and decimal columns.
    Number,
    /// Binary columns, decoded as UTF-8 text where possible.
    Buffer,
    /// JSON columns, serialized to their text form.
    Json,
}

impl std::str::FromStr for FetchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "buffer" => Ok(Self::Buffer),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown fetch kind '{other}', expected number, buffer or json"
            )),
        }
    }
}

/// Per-statement options. Unset fields fall back to the resource's
/// [`DriverSettings`](crate::config::DriverSettings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub out_format: Option<OutFormat>,
    #[serde(default)]
    pub fetch_as_string: Option<Vec<FetchKind>>,
    /// Maximum number of rows fetched. Unlimited when unset.
    #[serde(default)]
    pub max_rows: Option<u32>,
    /// Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

impl QueryOptions {
    pub fn out_format(mut self, format: OutFormat) -> Self {
        self.out_format = Some(format);
        self
    }

    pub fn fetch_as_string(mut self, kinds: impl Into<Vec<FetchKind>>) -> Self {
        self.fetch_as_string = Some(kinds.into());
        self
    }

    pub fn max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn timeout_secs(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs.min(MAX_QUERY_TIMEOUT_SECS));
        self
    }
}

/// A statement with its bind values and options.
///
/// Every way of describing a statement (`"sql"`, `("sql", binds)`,
/// `("sql", binds, options)` or the builder) converts into this one shape, so
/// all execution paths share a single (sql, binds, options) implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default, alias = "params")]
    pub binds: Vec<QueryParam>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl Statement {
    /// Create a statement without binds and with default options.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
            options: QueryOptions::default(),
        }
    }

    /// Add a bind value to this statement.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.binds.push(param.into());
        self
    }

    pub fn with_binds(mut self, binds: Vec<QueryParam>) -> Self {
        self.binds = binds;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl<S: Into<String>> From<(S, Vec<QueryParam>)> for Statement {
    fn from((sql, binds): (S, Vec<QueryParam>)) -> Self {
        Self::new(sql).with_binds(binds)
    }
}

impl<S: Into<String>> From<(S, Vec<QueryParam>, QueryOptions)> for Statement {
    fn from((sql, binds, options): (S, Vec<QueryParam>, QueryOptions)) -> Self {
        Self::new(sql).with_binds(binds).with_options(options)
    }
}

/// Metadata for a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Result of executing one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Columns of a row-returning statement; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_data: Vec<ColumnMetadata>,
    /// Rows shaped per the effective [`OutFormat`]; empty when none were returned.
    #[serde(default)]
    pub rows: Vec<JsonValue>,
    /// Rows changed by the statement, as reported by the driver.
    #[serde(default)]
    pub rows_affected: u64,
    /// More rows were available than `max_rows` allowed.
    #[serde(default)]
    pub has_more: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Returned rows, empty for statements that return none.
    pub fn rows(&self) -> &[JsonValue] {
        &self.rows
    }
}
