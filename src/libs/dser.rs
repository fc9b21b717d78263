use chrono::{DateTime, NaiveDate, Utc};
use serde::{
    de::{DeserializeOwned, Error},
    Deserialize, Deserializer,
};
use serde_json::Value;

use crate::error::{CrmError, CrmResult};

/// 解析请求体
///
/// Deserializes a JSON body, reporting a bad value under the name of the
/// field that carried it.
pub fn parse_body<T: DeserializeOwned>(value: Value) -> CrmResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let message = err.inner().to_string();
        let field = match err.path().to_string() {
            root if root == "." => missing_field(&message).unwrap_or("body").to_owned(),
            path => path,
        };
        CrmError::invalid(&field, message)
    })
}

/// serde reports a missing field at the root, naming it in the message.
fn missing_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc())
        })
}

/// Optional date field; `""` and `null` read as `None`.
pub fn deser_date<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(de)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date_time(v).map(Some).ok_or_else(|| {
            D::Error::custom(format!("invalid date {:?}, expected YYYY-MM-DD or RFC 3339", v))
        }),
    }
}

/// [`deser_date`] for patches, where `null` clears the column.
/// Use together with `#[serde(default)]`.
pub fn deser_nullable_date<'de, D>(de: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    deser_date(de).map(Some)
}

/// `""` and `null` both read as `None`; anything else is trimmed.
pub fn deser_empty_to_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(de)?;
    Ok(value.and_then(|v| {
        let v = v.trim();
        op::ternary!(v.is_empty() => None; Some(v.to_owned()))
    }))
}

/// Distinguishes a missing field (`None`) from an explicit `null`
/// (`Some(None)`), for patches that are allowed to clear a column.
/// Use together with `#[serde(default)]`.
pub fn deser_nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
