//! Serde helpers for Pipedrive's `YYYY-MM-DD HH:MM:SS` timestamps (UTC).
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Whole days elapsed between `ts` and `now`; negative if `ts` is in the future.
pub fn age_in_days(ts: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - ts).num_hours() / 24
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(|e| Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

/// `null`, a missing field, or `""` all decode to `None`.
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .map_err(|e| Error::custom(format!("invalid timestamp '{}': {}", raw, e))),
        }
    }

    pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super")]
        at: DateTime<Utc>,
        #[serde(default, with = "super::option")]
        maybe: Option<DateTime<Utc>>,
    }

    #[test]
    fn parses_pipedrive_format() {
        let s: Stamped =
            serde_json::from_str(r#"{"at": "2015-10-29 10:59:37", "maybe": null}"#).unwrap();
        assert_eq!(s.at, Utc.with_ymd_and_hms(2015, 10, 29, 10, 59, 37).unwrap());
        assert!(s.maybe.is_none());
    }

    #[test]
    fn empty_optional_timestamp_is_none() {
        let raw = r#"{"at": "2015-10-29 10:59:37", "maybe": ""}"#;
        let s: Stamped = serde_json::from_str(raw).unwrap();
        assert!(s.maybe.is_none());
        let s: Stamped = serde_json::from_str(r#"{"at": "2015-10-29 10:59:37"}"#).unwrap();
        assert!(s.maybe.is_none());
    }

    #[test]
    fn rejects_rfc3339() {
        let err = serde_json::from_str::<Stamped>(r#"{"at": "2015-10-29T10:59:37Z"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }

    #[test]
    fn serializes_back_to_wire_format() {
        let s = Stamped {
            at: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
            maybe: None,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["at"], "2020-01-02 03:04:05");
        assert!(json["maybe"].is_null());
    }

    #[test]
    fn age_counts_whole_days() {
        let then = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2020, 1, 3, 23, 0, 0).unwrap();
        assert_eq!(age_in_days(then, now), 2);
    }
}
