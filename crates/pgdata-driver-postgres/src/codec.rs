//! Conversion between pgdata values and PostgreSQL wire types

use bytes::BytesMut;
use pgdata_core::{PgDataError, Result, Value};
use postgres_types::Kind;
use tokio_postgres::{
    Row as PgRow,
    types::{FromSql, ToSql, Type},
};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Owned parameter value bound to a prepared statement.
///
/// tokio-postgres needs values implementing `ToSql`; the variant is chosen
/// from the statement's parameter type so integers are written with the
/// width the server expects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    Array(Vec<PgValue>),
}

impl PgValue {
    /// Convert a value into the variant matching the target parameter type
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),

            Value::Int16(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int32(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),

            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(f64::from(*v)),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },

            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => Self::coerce_string(v, target_type),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(items) => match target_type.kind() {
                Kind::Array(member) => PgValue::Array(
                    items
                        .iter()
                        .map(|item| Self::from_value_for_type(item, member))
                        .collect(),
                ),
                _ => PgValue::Array(items.iter().map(Self::from_value).collect()),
            },
        }
    }

    /// Pick the integer variant that matches the target column type
    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NUMERIC => {
                PgValue::String(value.to_string())
            }
            _ => PgValue::Int64(value),
        }
    }

    /// Parse string literals into typed values when the statement declares
    /// a concrete parameter type.
    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let fallback = || PgValue::String(value.to_string());
        match *target_type {
            Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| fallback()),
            Type::INT2 => value.parse().map(PgValue::Int16).unwrap_or_else(|_| fallback()),
            Type::INT4 => value.parse().map(PgValue::Int32).unwrap_or_else(|_| fallback()),
            Type::INT8 => value.parse().map(PgValue::Int64).unwrap_or_else(|_| fallback()),
            Type::DATE => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| fallback()),
            Type::TIME => chrono::NaiveTime::parse_from_str(value, "%H:%M:%S")
                .or_else(|_| chrono::NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
                .map(PgValue::Time)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMP => parse_naive_timestamp(value)
                .map(PgValue::DateTime)
                .unwrap_or_else(fallback),
            Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|ts| ts.with_timezone(&chrono::Utc))
                .or_else(|| parse_naive_timestamp(value).map(|ts| ts.and_utc()))
                .map(PgValue::DateTimeUtc)
                .unwrap_or_else(fallback),
            _ => fallback(),
        }
    }

    /// Used when the target type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(items) => PgValue::Array(items.iter().map(Self::from_value).collect()),
        }
    }

    /// Bind every parameter against the prepared statement's declared types
    pub(crate) fn bind_all(params: &[Value], param_types: &[Type]) -> Vec<PgValue> {
        params
            .iter()
            .enumerate()
            .map(|(i, value)| match param_types.get(i) {
                Some(target_type) => PgValue::from_value_for_type(value, target_type),
                None => PgValue::from_value(value),
            })
            .collect()
    }
}

fn parse_naive_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<postgres_types::IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::Array(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// NUMERIC decoded to its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

impl PgNumericString {
    pub(crate) fn parse(raw: &[u8]) -> std::result::Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }

        if sign == 0xC000 {
            return Ok("NaN".to_string());
        }

        let mut digits = Vec::with_capacity(ndigits);
        for index in 0..ndigits {
            let offset = 8 + index * 2;
            let group = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            if group > 9999 {
                return Err("invalid NUMERIC payload: group out of range".into());
            }
            digits.push(group);
        }

        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_group_count = if weight >= 0 { weight as usize + 1 } else { 0 };

        let mut integer_text = String::new();
        if integer_group_count == 0 {
            integer_text.push('0');
        } else {
            for group_index in 0..integer_group_count {
                let group = digits.get(group_index).copied().unwrap_or(0);
                if group_index == 0 {
                    integer_text.push_str(&group.to_string());
                } else {
                    integer_text.push_str(&format!("{group:04}"));
                }
            }
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            // negative weights mean leading zero groups after the point
            if weight < -1 {
                for _ in 0..(-weight - 1) {
                    fraction_text.push_str("0000");
                }
            }
            let start = integer_group_count.min(digits.len());
            for group in digits.iter().skip(start) {
                fraction_text.push_str(&format!("{group:04}"));
            }

            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }

            while fraction_text.ends_with('0') {
                fraction_text.pop();
            }
        }

        let mut output = String::new();
        if sign == 0x4000 {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }

        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw payload of types without a dedicated decoder (enums, PostGIS types)
#[derive(Debug)]
struct PgRawBytes(Vec<u8>);

impl<'a> FromSql<'a> for PgRawBytes {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get_opt<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        PgDataError::Driver(format!(
            "failed to decode column '{}': {}",
            row.columns()[idx].name(),
            e
        ))
    })
}

fn map_opt<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or(Value::Null)
}

fn map_array<T>(value: Option<Vec<T>>, f: impl Fn(T) -> Value) -> Value {
    value
        .map(|items| Value::Array(items.into_iter().map(f).collect()))
        .unwrap_or(Value::Null)
}

/// Convert one column of a PostgreSQL row to a [`Value`]
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_();

    let value = match ty.name() {
        "bool" => map_opt(get_opt::<bool>(row, idx)?, Value::Bool),
        "int2" => map_opt(get_opt::<i16>(row, idx)?, Value::Int16),
        "int4" => map_opt(get_opt::<i32>(row, idx)?, Value::Int32),
        "int8" => map_opt(get_opt::<i64>(row, idx)?, Value::Int64),
        "oid" => map_opt(get_opt::<u32>(row, idx)?, |v| Value::Int64(i64::from(v))),
        "float4" => map_opt(get_opt::<f32>(row, idx)?, Value::Float32),
        "float8" => map_opt(get_opt::<f64>(row, idx)?, Value::Float64),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => {
            map_opt(get_opt::<String>(row, idx)?, Value::String)
        }
        "bytea" => map_opt(get_opt::<Vec<u8>>(row, idx)?, Value::Bytes),
        "uuid" => map_opt(get_opt::<uuid::Uuid>(row, idx)?, Value::Uuid),
        "json" | "jsonb" => map_opt(get_opt::<serde_json::Value>(row, idx)?, Value::Json),
        "date" => map_opt(get_opt::<chrono::NaiveDate>(row, idx)?, Value::Date),
        "time" => map_opt(get_opt::<chrono::NaiveTime>(row, idx)?, Value::Time),
        "timestamp" => map_opt(get_opt::<chrono::NaiveDateTime>(row, idx)?, Value::DateTime),
        "timestamptz" => map_opt(
            get_opt::<chrono::DateTime<chrono::Utc>>(row, idx)?,
            Value::DateTimeUtc,
        ),
        "numeric" => map_opt(get_opt::<PgNumericString>(row, idx)?, |v| Value::Decimal(v.0)),
        "_text" | "_varchar" | "_bpchar" | "_name" => {
            map_array(get_opt::<Vec<String>>(row, idx)?, Value::String)
        }
        "_int2" => map_array(get_opt::<Vec<i16>>(row, idx)?, Value::Int16),
        "_int4" => map_array(get_opt::<Vec<i32>>(row, idx)?, Value::Int32),
        "_int8" => map_array(get_opt::<Vec<i64>>(row, idx)?, Value::Int64),
        "_float8" => map_array(get_opt::<Vec<f64>>(row, idx)?, Value::Float64),
        // PostGIS binary payloads stay as EWKB
        "geometry" | "geography" | "box2d" | "box3d" => {
            map_opt(get_opt::<PgRawBytes>(row, idx)?, |v| Value::Bytes(v.0))
        }
        _ => map_opt(get_opt::<PgRawBytes>(row, idx)?, |v| {
            match String::from_utf8(v.0) {
                Ok(text) => Value::String(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            }
        }),
    };

    Ok(value)
}

/// Quote a PostgreSQL identifier
pub fn escape_identifier_pg(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a table name which may include a schema (`schema.table`)
pub fn escape_table_name_pg(table_name: &str) -> String {
    match table_name.split_once('.') {
        Some((schema, table)) => format!(
            "{}.{}",
            escape_identifier_pg(schema),
            escape_identifier_pg(table)
        ),
        None => escape_identifier_pg(table_name),
    }
}
