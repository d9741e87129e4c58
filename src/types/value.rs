use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use super::{json, Interval, Range, SqlType};

/// Bind values keyed by parameter name.
pub type NamedArgs = HashMap<String, Value>;

/// A single SQL value, either bound as a parameter or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Interval(Interval),
    Range(Box<Range<Value>>),
    HStore(HashMap<String, Option<String>>),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Numeric(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The placeholder type a value implies when nothing else gives one.
    pub fn sql_type(&self) -> Option<SqlType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => SqlType::Boolean,
            Value::Int16(_) => SqlType::SmallInt,
            Value::Int32(_) => SqlType::Integer,
            Value::Int64(_) => SqlType::BigInt,
            Value::Float32(_) => SqlType::Real,
            Value::Float64(_) => SqlType::DoublePrecision,
            Value::Numeric(_) => SqlType::Numeric,
            Value::Text(_) => SqlType::Varchar(None),
            Value::Bytes(_) => SqlType::Bytea,
            Value::Date(_) => SqlType::Date,
            Value::Time(_) => SqlType::Time,
            Value::Timestamp(_) => SqlType::Timestamp,
            Value::TimestampTz(_) => SqlType::TimestampTz,
            Value::Uuid(_) => SqlType::Uuid,
            Value::Json(_) => SqlType::Json,
            Value::Interval(_) => SqlType::Interval,
            Value::HStore(_) => SqlType::HStore,
            Value::Range(range) => match range.lower().or(range.upper()) {
                Some(Value::Date(_)) => SqlType::DateRange,
                Some(Value::Timestamp(_)) => SqlType::TsRange,
                Some(Value::TimestampTz(_)) => SqlType::TsTzRange,
                Some(Value::Int16(_)) | Some(Value::Int32(_)) => SqlType::Int4Range,
                Some(Value::Int64(_)) => SqlType::Int8Range,
                Some(Value::Numeric(_)) => SqlType::NumRange,
                _ => return None,
            },
            Value::Array(items) => {
                SqlType::array_of(items.iter().find_map(Value::sql_type)?)
            }
        })
    }

    /// The value as a SQL literal, used when showing statements in logs.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::Numeric(_) => self.to_string(),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("'\\x{}'", hex)
            }
            Value::Range(range) if range.is_empty() => "'empty'".to_string(),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(Value::sql_literal).collect();
                format!("ARRAY[{}]", items.join(", "))
            }
            _ => quote_literal(&self.to_string()),
        }
    }

    /// Convert a JSON document into the closest matching value.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else {
                    match n.to_string().parse::<Decimal>() {
                        Ok(d) => Value::Numeric(d),
                        Err(_) => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
                    }
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            object @ serde_json::Value::Object(_) => Value::Json(object),
        }
    }
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn hstore_text(map: &HashMap<String, Option<String>>) -> String {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort();
    let quote = |s: &str| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""));
    pairs
        .into_iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}=>{}", quote(k), quote(v)),
            None => format!("{}=>NULL", quote(k)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Plain text form, the way `psql` would show the value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int16(i) => write!(f, "{}", i),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Numeric(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Json(j) => write!(f, "{}", j),
            Value::Interval(i) => write!(f, "{}", i),
            Value::Range(r) => write!(f, "{}", r),
            Value::HStore(map) => write!(f, "{}", hstore_text(map)),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", items.join(","))
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int16(i) => serializer.serialize_i16(*i),
            Value::Int32(i) => serializer.serialize_i32(*i),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Float32(v) => serializer.serialize_f32(*v),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::Numeric(d) => rust_decimal::serde::arbitrary_precision::serialize(d, serializer),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                serializer.serialize_str(&hex)
            }
            Value::Date(d) => d.serialize(serializer),
            Value::Time(t) => t.serialize(serializer),
            Value::Timestamp(ts) => ts.serialize(serializer),
            Value::TimestampTz(ts) => ts.serialize(serializer),
            Value::Uuid(u) => u.serialize(serializer),
            Value::Json(j) => j.serialize(serializer),
            Value::Interval(i) => i.serialize(serializer),
            Value::Range(r) => r.serialize(serializer),
            Value::HStore(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort();
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

fn int_to_sql(
    v: i64,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => Err(format!("cannot encode an integer as {}", ty).into()),
    }
}

fn float_to_sql(
    v: f64,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => Err(format!("cannot encode a float as {}", ty).into()),
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int16(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Int32(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Int64(i) => int_to_sql(*i, ty, out),
            Value::Float32(v) => float_to_sql(f64::from(*v), ty, out),
            Value::Float64(v) => float_to_sql(*v, ty, out),
            Value::Numeric(d) => d.to_sql_checked(ty, out),
            Value::Text(s) => s.to_sql_checked(ty, out),
            Value::Bytes(b) => b.to_sql_checked(ty, out),
            Value::Date(d) => d.to_sql_checked(ty, out),
            Value::Time(t) => t.to_sql_checked(ty, out),
            Value::Timestamp(ts) => ts.to_sql_checked(ty, out),
            Value::TimestampTz(ts) => ts.to_sql_checked(ty, out),
            Value::Uuid(u) => u.to_sql_checked(ty, out),
            Value::Json(j) => json::encode(j, ty, out),
            Value::Interval(i) => i.to_sql_checked(ty, out),
            Value::Range(r) => r.to_sql_checked(ty, out),
            Value::HStore(map) => map.to_sql_checked(ty, out),
            Value::Array(items) => items.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int16(i16::from_sql(ty, raw)?),
            Type::INT4 => Value::Int32(i32::from_sql(ty, raw)?),
            Type::INT8 => Value::Int64(i64::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::Float32(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => Value::Float64(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Numeric(Decimal::from_sql(ty, raw)?),
            Type::TEXT | Type::VARCHAR | Type::NAME | Type::BPCHAR | Type::UNKNOWN => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::DATE => Value::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIME => Value::Time(NaiveTime::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::UUID => Value::Uuid(Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(json::decode(ty, raw)?),
            Type::INTERVAL => Value::Interval(Interval::from_sql(ty, raw)?),
            _ => match ty.kind() {
                Kind::Range(_) => Value::Range(Box::new(Range::<Value>::from_sql(ty, raw)?)),
                Kind::Array(_) => Value::Array(Vec::<Value>::from_sql(ty, raw)?),
                Kind::Enum(_) => Value::Text(std::str::from_utf8(raw)?.to_string()),
                Kind::Domain(inner) => Value::from_sql(inner, raw)?,
                _ if ty.name() == "hstore" => {
                    Value::HStore(HashMap::<String, Option<String>>::from_sql(ty, raw)?)
                }
                _ => return Err(format!("unsupported column type {}", ty).into()),
            },
        })
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Numeric,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    serde_json::Value => Json,
    Interval => Interval,
    HashMap<String, Option<String>> => HStore,
    Vec<Value> => Array,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Range<T>> for Value {
    fn from(range: Range<T>) -> Self {
        Value::Range(Box::new(range.map(Into::into)))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
