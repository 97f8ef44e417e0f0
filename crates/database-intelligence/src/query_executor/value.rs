//! Conversion of driver-native column values into JSON.
//!
//! Dates become ISO-8601 strings and decimals become f64. Precision beyond
//! f64 is lost for very large NUMERIC/DECIMAL values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

pub type JsonRow = Map<String, Value>;

pub fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

pub fn decimal_value(d: Decimal) -> Value {
    d.to_f64().map(float_value).unwrap_or(Value::Null)
}

pub fn date_value(d: NaiveDate) -> Value {
    Value::String(d.format("%Y-%m-%d").to_string())
}

pub fn time_value(t: NaiveTime) -> Value {
    Value::String(t.format("%H:%M:%S").to_string())
}

pub fn naive_timestamp_value(ts: NaiveDateTime) -> Value {
    Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Lowercase hex, two characters per byte.
pub fn hex_value(bytes: &[u8]) -> Value {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    Value::String(out)
}

pub fn sqlite_value(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef as Sqlite;
    match value {
        Sqlite::Null => Value::Null,
        Sqlite::Integer(i) => Value::from(i),
        Sqlite::Real(f) => float_value(f),
        Sqlite::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        Sqlite::Blob(b) => hex_value(b),
    }
}

fn decode<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, _>(idx).ok()
}

fn is_null<R>(row: &R, idx: usize) -> bool
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|raw| raw.is_null()).unwrap_or(true)
}

pub fn pg_row_to_json(row: &PgRow) -> JsonRow {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), pg_value(row, idx, column.type_info().name()));
    }
    map
}

fn pg_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    if is_null(row, idx) {
        return Value::Null;
    }
    let value = match type_name {
        "BOOL" => decode::<_, bool>(row, idx).map(Value::Bool),
        "INT2" => decode::<_, i16>(row, idx).map(Value::from),
        "INT4" => decode::<_, i32>(row, idx).map(Value::from),
        "INT8" => decode::<_, i64>(row, idx).map(Value::from),
        "OID" => decode::<_, sqlx::postgres::types::Oid>(row, idx).map(|o| Value::from(o.0)),
        "FLOAT4" => decode::<_, f32>(row, idx).map(|f| float_value(f as f64)),
        "FLOAT8" => decode::<_, f64>(row, idx).map(float_value),
        "NUMERIC" => decode::<_, Decimal>(row, idx).map(decimal_value),
        "DATE" => decode::<_, NaiveDate>(row, idx).map(date_value),
        "TIME" => decode::<_, NaiveTime>(row, idx).map(time_value),
        "TIMESTAMP" => decode::<_, NaiveDateTime>(row, idx).map(naive_timestamp_value),
        "TIMESTAMPTZ" => decode::<_, DateTime<Utc>>(row, idx).map(timestamp_value),
        "JSON" | "JSONB" => decode::<_, Value>(row, idx),
        "UUID" => decode::<_, uuid::Uuid>(row, idx).map(|u| Value::String(u.to_string())),
        "BYTEA" => decode::<_, Vec<u8>>(row, idx).map(|b| hex_value(&b)),
        _ => decode::<_, String>(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

pub fn mysql_row_to_json(row: &MySqlRow) -> JsonRow {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), mysql_value(row, idx, column.type_info().name()));
    }
    map
}

fn mysql_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    if is_null(row, idx) {
        return Value::Null;
    }
    let value = match type_name {
        "BOOLEAN" => decode::<_, bool>(row, idx).map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            decode::<_, i64>(row, idx).map(Value::from)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => decode::<_, u64>(row, idx).map(Value::from),
        "FLOAT" => decode::<_, f32>(row, idx).map(|f| float_value(f as f64)),
        "DOUBLE" => decode::<_, f64>(row, idx).map(float_value),
        "DECIMAL" => decode::<_, Decimal>(row, idx).map(decimal_value),
        "DATE" => decode::<_, NaiveDate>(row, idx).map(date_value),
        "TIME" => decode::<_, NaiveTime>(row, idx).map(time_value),
        "DATETIME" => decode::<_, NaiveDateTime>(row, idx).map(naive_timestamp_value),
        "TIMESTAMP" => decode::<_, DateTime<Utc>>(row, idx).map(timestamp_value),
        "JSON" => decode::<_, Value>(row, idx),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            decode::<_, Vec<u8>>(row, idx).map(|b| hex_value(&b))
        }
        _ => decode::<_, String>(row, idx)
            .map(Value::String)
            .or_else(|| decode::<_, Vec<u8>>(row, idx).map(|b| hex_value(&b))),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_decimal_becomes_float() {
        let d = Decimal::from_str("1234.50").unwrap();
        assert_eq!(decimal_value(d), serde_json::json!(1234.5));
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(float_value(f64::NAN), Value::Null);
        assert_eq!(float_value(f64::INFINITY), Value::Null);
    }

    #[test]
    fn test_date_and_time_formats() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(date_value(date), Value::String("2024-03-09".into()));

        let time = NaiveTime::from_hms_opt(7, 5, 0).unwrap();
        assert_eq!(time_value(time), Value::String("07:05:00".into()));

        let naive = date.and_hms_opt(13, 45, 30).unwrap();
        assert_eq!(naive_timestamp_value(naive), Value::String("2024-03-09T13:45:30".into()));

        let utc = Utc.with_ymd_and_hms(2024, 3, 9, 13, 45, 30).unwrap();
        assert_eq!(timestamp_value(utc), Value::String("2024-03-09T13:45:30Z".into()));
    }

    #[test]
    fn test_hex_blob() {
        assert_eq!(hex_value(&[0x00, 0xab, 0x10]), Value::String("00ab10".into()));
        assert_eq!(hex_value(&[]), Value::String(String::new()));
    }

    #[test]
    fn test_sqlite_values() {
        use rusqlite::types::ValueRef;
        assert_eq!(sqlite_value(ValueRef::Null), Value::Null);
        assert_eq!(sqlite_value(ValueRef::Integer(42)), Value::from(42));
        assert_eq!(sqlite_value(ValueRef::Real(1.5)), serde_json::json!(1.5));
        assert_eq!(sqlite_value(ValueRef::Text(b"abc")), Value::String("abc".into()));
        assert_eq!(sqlite_value(ValueRef::Blob(&[1, 2])), Value::String("0102".into()));
    }
}
