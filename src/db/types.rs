//! Row decoding and result shaping.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders extract the value for that category
//!
//! The decoded value then passes through the resource's fetch-as-string
//! rules before the row is shaped per [`OutFormat`].

use crate::config::ResolvedOptions;
use crate::models::{ColumnMetadata, DatabaseType, FetchKind, OutFormat};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
}

impl TypeCategory {
    /// Categories affected by [`FetchKind::Number`].
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first, "numeric" would otherwise never reach the float rules
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores plain numbers
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if (lower.contains("int") && !lower.contains("interval") && lower != "point")
        || lower.contains("serial")
        || lower.contains("tiny")
    {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // varchar, text, char, date, time and anything unrecognised
    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Decode binary data to a JSON string.
///
/// With `as_text`, valid UTF-8 is returned verbatim. Everything else is
/// base64 encoded.
pub fn decode_binary_value(bytes: &[u8], as_text: bool) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) if as_text => JsonValue::String(s.to_string()),
        _ => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Apply the fetch-as-string rules to a decoded value.
pub fn coerce_value(value: JsonValue, category: TypeCategory, options: &ResolvedOptions) -> JsonValue {
    match value {
        JsonValue::Number(n) if category.is_numeric() && options.coerces(FetchKind::Number) => {
            JsonValue::String(n.to_string())
        }
        JsonValue::Null | JsonValue::String(_) => value,
        v if category == TypeCategory::Json && options.coerces(FetchKind::Json) => {
            JsonValue::String(v.to_string())
        }
        v => v,
    }
}

/// Shape one row's `(column, value)` pairs per the output format.
pub fn shape_row(values: Vec<(String, JsonValue)>, format: OutFormat) -> JsonValue {
    match format {
        OutFormat::Array => JsonValue::Array(values.into_iter().map(|(_, v)| v).collect()),
        OutFormat::Object => JsonValue::Object(values.into_iter().collect()),
    }
}

/// Conversion of a fetched row into JSON column values.
pub trait RowToJson {
    /// Column names and type names, in select-list order.
    fn column_metadata(&self) -> Vec<ColumnMetadata>;

    /// Decoded `(column, value)` pairs, in select-list order.
    fn column_values(&self, options: &ResolvedOptions) -> Vec<(String, JsonValue)>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:ident) => {
        impl RowToJson for $row {
            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| ColumnMetadata::new(col.name(), col.type_info().name(), true))
                    .collect()
            }

            fn column_values(&self, options: &ResolvedOptions) -> Vec<(String, JsonValue)> {
                self.columns()
                    .iter()
                    .map(|col| {
                        let category = $decoder::refine_category(
                            self,
                            col.ordinal(),
                            categorize_type(col.type_info().name(), $db),
                        );
                        let value = $decoder::decode_column(self, col.ordinal(), category, options);
                        (col.name().to_string(), coerce_value(value, category, options))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite);

/// Typed column read where a NULL and an incompatible type both yield `None`.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn text_or_json(text: Option<String>, category: TypeCategory) -> JsonValue {
    match text {
        Some(v) if category == TypeCategory::Json => {
            serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
        }
        Some(v) => JsonValue::String(v),
        None => JsonValue::Null,
    }
}

mod mysql {
    use super::*;

    pub fn refine_category(_row: &MySqlRow, _idx: usize, declared: TypeCategory) -> TypeCategory {
        declared
    }

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        category: TypeCategory,
        options: &ResolvedOptions,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx)
                .map(|d| JsonValue::String(d.0))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => get::<_, f64>(row, idx)
                .or_else(|| get::<_, f32>(row, idx).map(f64::from))
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .map(|v| decode_binary_value(&v, options.coerces(FetchKind::Buffer)))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => get::<_, JsonValue>(row, idx)
                .unwrap_or_else(|| text_or_json(get(row, idx), category)),
            _ => text_or_json(get(row, idx), category),
        }
    }

    // MySQL integer columns only decode into their exact width and signedness
    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i8>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u16>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u8>(row, idx).map(JsonValue::from))
            .unwrap_or(JsonValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn refine_category(_row: &PgRow, _idx: usize, declared: TypeCategory) -> TypeCategory {
        declared
    }

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        category: TypeCategory,
        options: &ResolvedOptions,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx)
                .map(|d| JsonValue::String(d.0))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .map(JsonValue::from)
                .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
                .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => get::<_, f64>(row, idx)
                .or_else(|| get::<_, f32>(row, idx).map(f64::from))
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .map(|v| decode_binary_value(&v, options.coerces(FetchKind::Buffer)))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => get::<_, JsonValue>(row, idx).unwrap_or(JsonValue::Null),
            // uuid and text types read back through their textual form
            _ => text_or_json(get(row, idx), category),
        }
    }
}

mod sqlite {
    use super::*;

    /// Expression columns (`SELECT 1`, `COUNT(*)`) have no declared type;
    /// classify them by the storage class of the value instead.
    pub fn refine_category(row: &SqliteRow, idx: usize, declared: TypeCategory) -> TypeCategory {
        if declared != TypeCategory::Text {
            return declared;
        }
        match row.try_get_raw(idx) {
            Ok(value) if !value.is_null() => {
                categorize_type(value.type_info().name(), DatabaseType::SQLite)
            }
            _ => declared,
        }
    }

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        category: TypeCategory,
        options: &ResolvedOptions,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float | TypeCategory::Decimal => get::<_, f64>(row, idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .map(|v| decode_binary_value(&v, options.coerces(FetchKind::Buffer)))
                .unwrap_or(JsonValue::Null),
            _ => text_or_json(get(row, idx), category),
        }
    }
}
