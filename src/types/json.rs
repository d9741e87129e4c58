use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::error::Error as StdError;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};

const JSONB_VERSION: u8 = 1;

/// Serialize any value to compact JSON text.
///
/// [`Value::Numeric`](crate::types::Value::Numeric) is written as a JSON
/// number with its exact digits. Dates and timestamps become ISO-8601
/// strings, UUIDs their canonical text and ranges their `[lo,hi)` form.
pub fn json_encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Parse JSON text, keeping numbers at full precision.
pub fn json_decode(text: &str) -> serde_json::Result<serde_json::Value> {
    serde_json::from_str(text)
}

/// Encode a JSON document for a `json` or `jsonb` parameter.
pub(crate) fn encode(
    value: &serde_json::Value,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::JSONB => out.put_u8(JSONB_VERSION),
        Type::JSON => {}
        _ => return Err(format!("cannot encode JSON as {}", ty).into()),
    }
    out.put_slice(json_encode(value)?.as_bytes());
    Ok(IsNull::No)
}

pub(crate) fn decode(ty: &Type, raw: &[u8]) -> Result<serde_json::Value, Box<dyn StdError + Sync + Send>> {
    let body = match *ty {
        Type::JSONB => match raw.split_first() {
            Some((&JSONB_VERSION, rest)) => rest,
            Some((version, _)) => return Err(format!("unsupported jsonb version {}", version).into()),
            None => return Err("empty jsonb payload".into()),
        },
        _ => raw,
    };
    Ok(json_decode(std::str::from_utf8(body)?)?)
}

/// A `json` parameter or column.
#[derive(Debug, Clone, PartialEq)]
pub struct Json(pub serde_json::Value);

/// A `jsonb` parameter or column.
#[derive(Debug, Clone, PartialEq)]
pub struct Jsonb(pub serde_json::Value);

impl ToSql for Json {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        encode(&self.0, ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Json {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        decode(ty, raw).map(Json)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON
    }
}

impl ToSql for Jsonb {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        encode(&self.0, ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSONB
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Jsonb {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        decode(ty, raw).map(Jsonb)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSONB
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Range, Value};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_encode_domain_values() {
        let birthdate = NaiveDate::from_ymd_opt(1968, 3, 18).unwrap();
        let validity = Range::new(
            NaiveDate::from_ymd_opt(2017, 1, 31),
            NaiveDate::from_ymd_opt(2017, 3, 31),
        );
        let details = json!({
            "height": Value::Numeric(Decimal::from_str("1.69").unwrap()),
            "birthdate": birthdate,
            "validity": validity,
        });

        let text = json_encode(&details).unwrap();
        assert!(text.contains(r#""height":1.69"#));
        let decoded = json_decode(&text).unwrap();
        assert_eq!(decoded["height"].to_string(), "1.69");
        assert_eq!(decoded["birthdate"], "1968-03-18");
        assert_eq!(decoded["validity"], "[2017-01-31,2017-03-31)");
    }

    #[test]
    fn test_decimal_precision_survives() {
        let decoded = json_decode("{\"amount\": 1234567890.123456789}").unwrap();
        let amount = Decimal::from_str(&decoded["amount"].to_string()).unwrap();
        assert_eq!(amount.to_string(), "1234567890.123456789");
    }

    #[test]
    fn test_jsonb_carries_version_byte() {
        let mut buf = BytesMut::new();
        Jsonb(json!({"a": 1}))
            .to_sql_checked(&Type::JSONB, &mut buf)
            .unwrap();
        assert_eq!(buf[0], JSONB_VERSION);
        assert_eq!(&buf[1..], b"{\"a\":1}");

        let decoded = Jsonb::from_sql(&Type::JSONB, &buf).unwrap();
        assert_eq!(decoded, Jsonb(json!({"a": 1})));
    }

    #[test]
    fn test_json_has_no_version_byte() {
        let mut buf = BytesMut::new();
        Json(json!([1, "two"]))
            .to_sql_checked(&Type::JSON, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"[1,\"two\"]");
        assert_eq!(
            Json::from_sql(&Type::JSON, &buf).unwrap(),
            Json(json!([1, "two"]))
        );
    }

    #[test]
    fn test_unknown_jsonb_version_is_rejected() {
        assert!(decode(&Type::JSONB, b"\x02{}").is_err());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let mut buf = BytesMut::new();
        assert!(Json(json!(null)).to_sql_checked(&Type::JSONB, &mut buf).is_err());
    }
}
