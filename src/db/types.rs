//! Row and parameter types shared by the query executor.
//!
//! Result rows are converted to JSON maps so capability outputs are plain
//! serde values. Conversion classifies the column's database type into a
//! logical category first, then decodes with the narrowest sqlx type that
//! fits.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A positional parameter for parameterized statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Column metadata attached to query results.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
    pub nullable: bool,
}

/// Result of one executed read-only statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// True if more rows matched than the limit allowed.
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Result with no rows (e.g., an empty table).
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            execution_time_ms,
        }
    }
}

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Text,
}

fn categorize(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// DECIMAL/NUMERIC values decoded as their exact textual representation.
#[derive(Debug)]
struct DecimalText(String);

impl Type<sqlx::MySql> for DecimalText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for DecimalText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for DecimalText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for DecimalText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

/// Binary values become UTF-8 text when they decode cleanly, base64 otherwise.
fn binary_to_json(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

macro_rules! column_metadata_impl {
    () => {
        fn column_metadata(&self) -> Vec<ColumnMetadata> {
            self.columns()
                .iter()
                .map(|col| ColumnMetadata {
                    name: col.name().to_string(),
                    type_name: col.type_info().name().to_string(),
                    nullable: !col.type_info().is_null(),
                })
                .collect()
        }
    };
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                // SQLite stores dynamically typed values; try the concrete
                // types in narrowing order.
                let value = if let Ok(Some(v)) = self.try_get::<Option<i64>, _>(idx) {
                    JsonValue::Number(v.into())
                } else if let Ok(Some(v)) = self.try_get::<Option<f64>, _>(idx) {
                    float_to_json(v)
                } else if let Ok(Some(v)) = self.try_get::<Option<String>, _>(idx) {
                    JsonValue::String(v)
                } else if let Ok(Some(v)) = self.try_get::<Option<Vec<u8>>, _>(idx) {
                    binary_to_json(&v)
                } else {
                    JsonValue::Null
                };
                (col.name().to_string(), value)
            })
            .collect()
    }

    column_metadata_impl!();
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let value = match categorize(col.type_info().name()) {
                    TypeCategory::Integer => {
                        if let Ok(Some(v)) = self.try_get::<Option<i16>, _>(idx) {
                            JsonValue::Number(v.into())
                        } else if let Ok(Some(v)) = self.try_get::<Option<i32>, _>(idx) {
                            JsonValue::Number(v.into())
                        } else if let Ok(Some(v)) = self.try_get::<Option<i64>, _>(idx) {
                            JsonValue::Number(v.into())
                        } else {
                            JsonValue::Null
                        }
                    }
                    TypeCategory::Float => self
                        .try_get::<Option<f64>, _>(idx)
                        .ok()
                        .flatten()
                        .map(float_to_json)
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Decimal => self
                        .try_get::<Option<DecimalText>, _>(idx)
                        .ok()
                        .flatten()
                        .map(|v| JsonValue::String(v.0))
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Boolean => self
                        .try_get::<Option<bool>, _>(idx)
                        .ok()
                        .flatten()
                        .map(JsonValue::Bool)
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Json => self
                        .try_get::<Option<JsonValue>, _>(idx)
                        .ok()
                        .flatten()
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Binary => self
                        .try_get::<Option<Vec<u8>>, _>(idx)
                        .ok()
                        .flatten()
                        .map(|v| binary_to_json(&v))
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Text => self
                        .try_get::<Option<String>, _>(idx)
                        .ok()
                        .flatten()
                        .map(JsonValue::String)
                        .unwrap_or(JsonValue::Null),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }

    column_metadata_impl!();
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let value = match categorize(col.type_info().name()) {
                    TypeCategory::Integer => {
                        if let Ok(Some(v)) = self.try_get::<Option<i64>, _>(idx) {
                            JsonValue::Number(v.into())
                        } else if let Ok(Some(v)) = self.try_get::<Option<u64>, _>(idx) {
                            JsonValue::Number(v.into())
                        } else {
                            JsonValue::Null
                        }
                    }
                    TypeCategory::Float => self
                        .try_get::<Option<f64>, _>(idx)
                        .ok()
                        .flatten()
                        .map(float_to_json)
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Decimal => self
                        .try_get::<Option<DecimalText>, _>(idx)
                        .ok()
                        .flatten()
                        .map(|v| JsonValue::String(v.0))
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Boolean => self
                        .try_get::<Option<bool>, _>(idx)
                        .ok()
                        .flatten()
                        .map(JsonValue::Bool)
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Json => self
                        .try_get::<Option<JsonValue>, _>(idx)
                        .ok()
                        .flatten()
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Binary => self
                        .try_get::<Option<Vec<u8>>, _>(idx)
                        .ok()
                        .flatten()
                        .map(|v| binary_to_json(&v))
                        .unwrap_or(JsonValue::Null),
                    TypeCategory::Text => self
                        .try_get::<Option<String>, _>(idx)
                        .ok()
                        .flatten()
                        .map(JsonValue::String)
                        .unwrap_or(JsonValue::Null),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }

    column_metadata_impl!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_integers() {
        assert_eq!(categorize("INT8"), TypeCategory::Integer);
        assert_eq!(categorize("bigint"), TypeCategory::Integer);
        assert_eq!(categorize("TINYINT"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_decimal_before_numeric_float() {
        assert_eq!(categorize("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize("decimal(10,2)"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_misc() {
        assert_eq!(categorize("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize("double precision"), TypeCategory::Float);
        assert_eq!(categorize("jsonb"), TypeCategory::Json);
        assert_eq!(categorize("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize("varchar"), TypeCategory::Text);
    }

    #[test]
    fn test_binary_to_json_prefers_utf8() {
        assert_eq!(binary_to_json(b"hello"), JsonValue::String("hello".into()));
        // 0xFF is not valid UTF-8; expect base64
        assert_eq!(
            binary_to_json(&[0xFF, 0xFE]),
            JsonValue::String("//4=".into())
        );
    }

    #[test]
    fn test_query_param_deserialization_is_untagged() {
        let params: Vec<QueryParam> = serde_json::from_str(r#"[null, true, 42, 1.5, "x"]"#).unwrap();
        assert!(matches!(params[0], QueryParam::Null));
        assert!(matches!(params[1], QueryParam::Bool(true)));
        assert!(matches!(params[2], QueryParam::Int(42)));
        assert!(matches!(params[3], QueryParam::Float(_)));
        assert!(matches!(params[4], QueryParam::String(_)));
    }
}
