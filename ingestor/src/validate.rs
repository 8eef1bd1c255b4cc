use crate::errors::{Error, Result};
use crate::model::Reading;
use serde_json::Value;

const MISSING_FIELDS: &str = "Missing required fields: device_id, people_count, api_key";
const INVALID_COUNT: &str = "people_count must be a non-negative integer";

/// Parses and validates an ingestion body.
///
/// Runs before any credential check, so a malformed reading is rejected
/// without touching the store.
pub fn parse_reading(body: &[u8]) -> Result<Reading> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::Validation(format!("Invalid JSON body: {}", e)))?;

    let device_id = non_empty_str(&value, "device_id");
    let api_key = non_empty_str(&value, "api_key");
    let people_count = value.get("people_count");

    let (Some(device_id), Some(api_key), Some(people_count)) = (device_id, api_key, people_count)
    else {
        return Err(Error::Validation(MISSING_FIELDS.to_string()));
    };

    let people_count =
        parse_count(people_count).ok_or_else(|| Error::Validation(INVALID_COUNT.to_string()))?;

    Ok(Reading {
        device_id: device_id.to_string(),
        people_count,
        api_key: api_key.to_string(),
    })
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// Whole-valued floats such as `12.0` are accepted; the store column is i32.
fn parse_count(value: &Value) -> Option<i32> {
    let Value::Number(n) = value else {
        return None;
    };

    let count = n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })?;

    i32::try_from(count).ok()
}

/// Checks the query parameters of a status request.
pub fn require_params<'a>(
    device_id: Option<&'a str>,
    api_key: Option<&'a str>,
) -> Result<(&'a str, &'a str)> {
    match (
        device_id.filter(|s| !s.is_empty()),
        api_key.filter(|s| !s.is_empty()),
    ) {
        (Some(device_id), Some(api_key)) => Ok((device_id, api_key)),
        _ => Err(Error::Validation(
            "Missing required params: device_id, api_key".to_string(),
        )),
    }
}
