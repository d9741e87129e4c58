use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::ast::Column;
use crate::error::CompileError;
use crate::types::{NamedArgs, SqlType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(de::Error::custom(format!("invalid sort direction {:?}", text))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortKey {
    #[serde(alias = "property")]
    pub attribute: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum FilterOperator {
    #[default]
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = "ILIKE", alias = "ilike")]
    ILike,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Filter {
    #[serde(alias = "property")]
    pub attribute: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: FilterOperator,
}

/// What a listing call should compute.
///
/// `filters` and `sort` are accepted either as arrays or as JSON encoded
/// strings, the way browser grids usually send them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingRequest {
    #[serde(deserialize_with = "list_or_encoded")]
    pub filters: Vec<Filter>,
    #[serde(deserialize_with = "list_or_encoded")]
    pub sort: Vec<SortKey>,
    pub start: Option<u64>,
    /// `Some(0)` asks for the metadata only.
    pub limit: Option<u64>,
    pub count: bool,
    pub rows: bool,
    pub metadata: bool,
    #[serde(alias = "asdict")]
    pub as_map: bool,
    pub status: bool,
    /// Named arguments for bind parameters of the base query.
    #[serde(deserialize_with = "named_args")]
    pub params: NamedArgs,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            start: None,
            limit: None,
            count: false,
            rows: true,
            metadata: false,
            as_map: false,
            status: true,
            params: NamedArgs::new(),
        }
    }
}

impl ListingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        mut self,
        attribute: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.filters.push(Filter {
            attribute: attribute.into(),
            value: value.into(),
            operator,
        });
        self
    }

    pub fn sort_by(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortKey {
            attribute: attribute.into(),
            direction,
        });
        self
    }

    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn without_rows(mut self) -> Self {
        self.rows = false;
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.metadata = true;
        self
    }

    pub fn as_map(mut self) -> Self {
        self.as_map = true;
        self
    }

    pub fn without_status(mut self) -> Self {
        self.status = false;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Only the shape of the result is wanted, no data.
    pub(crate) fn metadata_only(&self) -> bool {
        self.limit == Some(0)
    }
}

fn list_or_encoded<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr<T> {
        Encoded(String),
        List(Vec<T>),
    }

    match Option::<Repr<T>>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Repr::List(items)) => Ok(items),
        Some(Repr::Encoded(text)) if text.trim().is_empty() => Ok(Vec::new()),
        Some(Repr::Encoded(text)) => serde_json::from_str(&text).map_err(de::Error::custom),
    }
}

fn named_args<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NamedArgs, D::Error> {
    let raw = Option::<HashMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, Value::from_json(value)))
        .collect())
}

/// Convert a filter value to the type of the column it is compared with.
pub(crate) fn coerce(value: &serde_json::Value, column: &Column) -> Result<Value, CompileError> {
    use serde_json::Value as Json;

    let invalid = |reason: &str| CompileError::InvalidValue {
        column: column.key.clone(),
        reason: reason.to_string(),
    };
    let text = match value {
        Json::Null => return Ok(Value::Null),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };

    let Some(sql_type) = &column.sql_type else {
        return Ok(Value::from_json(value.clone()));
    };
    let coerced = match sql_type {
        SqlType::Boolean => match value {
            Json::Bool(b) => Value::Bool(*b),
            _ => match text.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Value::Bool(true),
                "false" | "f" | "0" | "no" => Value::Bool(false),
                _ => return Err(invalid("not a boolean")),
            },
        },
        SqlType::SmallInt => Value::Int16(parse(&text).ok_or_else(|| invalid("not a smallint"))?),
        SqlType::Integer => Value::Int32(parse(&text).ok_or_else(|| invalid("not an integer"))?),
        SqlType::BigInt => Value::Int64(parse(&text).ok_or_else(|| invalid("not a bigint"))?),
        SqlType::Real => Value::Float32(parse(&text).ok_or_else(|| invalid("not a number"))?),
        SqlType::DoublePrecision => Value::Float64(parse(&text).ok_or_else(|| invalid("not a number"))?),
        SqlType::Numeric => Value::Numeric(
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|_| invalid("not a number"))?,
        ),
        SqlType::Date => Value::Date(
            NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|_| invalid("not a date"))?,
        ),
        SqlType::Timestamp => Value::Timestamp(
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|_| invalid("not a timestamp"))?,
        ),
        SqlType::TimestampTz => Value::TimestampTz(
            DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| invalid("not a timestamp with time zone"))?,
        ),
        SqlType::Uuid => Value::Uuid(Uuid::parse_str(&text).map_err(|_| invalid("not a UUID"))?),
        SqlType::Json | SqlType::Jsonb => Value::Json(value.clone()),
        SqlType::Varchar(_) | SqlType::Text => Value::Text(text),
        _ => Value::from_json(value.clone()),
    };
    Ok(coerced)
}

fn parse<T: FromStr>(text: &str) -> Option<T> {
    text.trim().parse().ok()
}
