//! Text templates for record output.
//!
//! A template is literal text with `{{ ... }}` actions:
//!
//! * `{{.a.b}}` prints a field of the record's JSON form (`{{.}}` prints the
//!   whole record). Keys match exactly, else case-insensitively with
//!   underscores ignored, so `{{.AddTime}}` finds `add_time`.
//! * `{{Age .path}}` prints whole days since the timestamp at `path`.
//! * `{{Org .path}}` and `{{(Org .path).x}}` fetch the organization whose id
//!   is at `path` and print it, or one of its fields.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::Api;
use crate::error::{Error, Result};
use crate::model::Organization;
use crate::time::{age_in_days, parse_timestamp};

static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.(?:[^.\s(){}]+(?:\.[^.\s(){}]+)*)?$").expect("PATH_RE should compile")
});
static AGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Age\s+(\S+)$").expect("AGE_RE should compile"));
static ORG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Org\s+(\S+)$").expect("ORG_RE should compile"));
static ORG_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(\s*Org\s+(\S+?)\s*\)(\..+)$").expect("ORG_FIELD_RE should compile")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template: unclosed action at byte {0}")]
    Unclosed(usize),
    #[error("template: empty action at byte {0}")]
    Empty(usize),
    #[error("template: cannot parse action '{0}'")]
    Unknown(String),
    #[error("template: field '{0}' not found")]
    MissingField(String),
    #[error("template: '{path}' is not a timestamp: {value}")]
    NotTimestamp { path: String, value: String },
    #[error("template: '{path}' is not an organization id: {value}")]
    NotAnId { path: String, value: String },
}

/// Resolves organization ids for `Org` actions.
#[async_trait]
pub trait OrganizationLookup: Send + Sync {
    async fn organization(&self, id: u64) -> Result<Organization>;
}

#[async_trait]
impl OrganizationLookup for Api {
    async fn organization(&self, id: u64) -> Result<Organization> {
        self.fetch_organization(id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
    raw: String,
    keys: Vec<String>,
}

impl Path {
    fn parse(raw: &str) -> Option<Path> {
        if !PATH_RE.is_match(raw) {
            return None;
        }
        Some(Path {
            raw: raw.to_string(),
            keys: raw
                .split('.')
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn resolve<'v>(&self, root: &'v Value) -> std::result::Result<&'v Value, TemplateError> {
        self.keys
            .iter()
            .try_fold(root, |cur, key| lookup_key(cur, key))
            .ok_or_else(|| TemplateError::MissingField(self.raw.clone()))
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup_key<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    let obj = value.as_object()?;
    if let Some(found) = obj.get(key) {
        return Some(found);
    }
    let wanted = normalize(key);
    obj.iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Path),
    Age(Path),
    Org { id: Path, field: Option<Path> },
}

fn parse_action(expr: &str, offset: usize) -> std::result::Result<Segment, TemplateError> {
    if expr.is_empty() {
        return Err(TemplateError::Empty(offset));
    }
    let unknown = || TemplateError::Unknown(expr.to_string());
    if let Some(path) = Path::parse(expr) {
        return Ok(Segment::Field(path));
    }
    if let Some(caps) = AGE_RE.captures(expr) {
        let path = Path::parse(&caps[1]).ok_or_else(unknown)?;
        return Ok(Segment::Age(path));
    }
    if let Some(caps) = ORG_RE.captures(expr) {
        let id = Path::parse(&caps[1]).ok_or_else(unknown)?;
        return Ok(Segment::Org { id, field: None });
    }
    if let Some(caps) = ORG_FIELD_RE.captures(expr) {
        let id = Path::parse(&caps[1]).ok_or_else(unknown)?;
        let field = Path::parse(&caps[2]).ok_or_else(unknown)?;
        return Ok(Segment::Org {
            id,
            field: Some(field),
        });
    }
    Err(unknown())
}

/// Strings print verbatim, null prints nothing, everything else as compact
/// JSON.
fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Ids may be bare numbers, numeric strings or `{"value": id, ...}` objects.
fn organization_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(obj) => obj.get("value").and_then(organization_id),
        _ => None,
    }
}

/// A parsed template. Build once per process and reuse for every record.
#[derive(Debug, Clone)]
pub struct Renderer {
    segments: Vec<Segment>,
    append_newline: bool,
}

impl Renderer {
    pub fn new(template: &str, append_newline: bool) -> std::result::Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0usize;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + open))?;
            segments.push(parse_action(after[..close].trim(), offset + open)?);
            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self {
            segments,
            append_newline,
        })
    }

    /// True if rendering may call the organization lookup.
    pub fn uses_lookup(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Org { .. }))
    }

    pub async fn render<T>(&self, record: &T, lookup: &dyn OrganizationLookup) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        self.render_at(record, lookup, Utc::now()).await
    }

    pub async fn render_at<T>(
        &self,
        record: &T,
        lookup: &dyn OrganizationLookup,
        now: DateTime<Utc>,
    ) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let root = serde_json::to_value(record).map_err(Error::Serialize)?;
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(path) => out.push_str(&display(path.resolve(&root)?)),
                Segment::Age(path) => {
                    let value = path.resolve(&root)?;
                    let ts = value
                        .as_str()
                        .and_then(|raw| parse_timestamp(raw).ok())
                        .ok_or_else(|| TemplateError::NotTimestamp {
                            path: path.raw.clone(),
                            value: value.to_string(),
                        })?;
                    out.push_str(&age_in_days(ts, now).to_string());
                }
                Segment::Org { id, field } => {
                    let value = id.resolve(&root)?;
                    let org_id = organization_id(value).ok_or_else(|| TemplateError::NotAnId {
                        path: id.raw.clone(),
                        value: value.to_string(),
                    })?;
                    let org = lookup.organization(org_id).await?;
                    let org = serde_json::to_value(&org).map_err(Error::Serialize)?;
                    match field {
                        Some(field) => out.push_str(&display(field.resolve(&org)?)),
                        None => out.push_str(&display(&org)),
                    }
                }
            }
        }
        if self.append_newline {
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeOrgs {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrganizationLookup for FakeOrgs {
        async fn organization(&self, id: u64) -> Result<Organization> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id != 2703 {
                return Err(Error::NotFound {
                    kind: "organization",
                    name: id.to_string(),
                });
            }
            Ok(serde_json::from_value(json!({
                "id": 2703,
                "name": "Kai GmbH",
                "address": "Hauptstr. 1"
            }))
            .unwrap())
        }
    }

    fn deal() -> Value {
        json!({
            "id": 674,
            "status": "open",
            "title": "Kitchen",
            "lost_reason": null,
            "add_time": "2021-03-01 00:00:00",
            "org_id": {"value": 2703, "name": "Kai GmbH"},
            "value": 1384.7,
            "custom_fields": {"E-Mail": "kai@example.com"}
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 11, 12, 0, 0).unwrap()
    }

    async fn render(template: &str, newline: bool) -> Result<String> {
        let orgs = FakeOrgs::default();
        Renderer::new(template, newline)?
            .render_at(&deal(), &orgs, now())
            .await
    }

    #[tokio::test]
    async fn default_template() {
        assert_eq!(render("{{.id}} {{.status}}", true).await.unwrap(), "674 open\n");
        assert_eq!(render("{{.id}} {{.status}}", false).await.unwrap(), "674 open");
    }

    #[tokio::test]
    async fn keys_match_loosely() {
        let out = render("{{.Id}}|{{ .AddTime }}|{{.OrgID.Name}}", false)
            .await
            .unwrap();
        assert_eq!(out, "674|2021-03-01 00:00:00|Kai GmbH");
    }

    #[tokio::test]
    async fn value_display_rules() {
        assert_eq!(
            render("[{{.lost_reason}}] {{.value}} {{.custom_fields.E-Mail}}", false)
                .await
                .unwrap(),
            "[] 1384.7 kai@example.com"
        );
        let nested = render("{{.org_id}}", false).await.unwrap();
        let nested: Value = serde_json::from_str(&nested).unwrap();
        assert_eq!(nested, json!({"value": 2703, "name": "Kai GmbH"}));
    }

    #[tokio::test]
    async fn age_in_whole_days() {
        assert_eq!(render("{{Age .add_time}}", false).await.unwrap(), "10");
        let err = render("{{Age .title}}", false).await.unwrap_err();
        assert!(matches!(err, Error::Template(TemplateError::NotTimestamp { .. })));
    }

    #[tokio::test]
    async fn org_helper_fetches() {
        let orgs = FakeOrgs::default();
        let renderer = Renderer::new(
            "{{(Org .org_id).name}} / {{(Org .OrgId.Value).address}}",
            false,
        )
        .unwrap();
        assert!(renderer.uses_lookup());
        let out = renderer.render_at(&deal(), &orgs, now()).await.unwrap();
        assert_eq!(out, "Kai GmbH / Hauptstr. 1");
        assert_eq!(orgs.calls.load(Ordering::SeqCst), 2);

        let whole = render("{{Org .org_id}}", false).await.unwrap();
        assert!(whole.contains("\"name\":\"Kai GmbH\""));
    }

    #[tokio::test]
    async fn org_lookup_failure_propagates() {
        let orgs = FakeOrgs::default();
        let renderer = Renderer::new("{{Org .id}}", false).unwrap();
        let err = renderer.render_at(&deal(), &orgs, now()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no representation"))
        }
    }

    #[tokio::test]
    async fn unserializable_record_is_a_serialize_error() {
        let renderer = Renderer::new("{{.id}}", false).unwrap();
        let err = renderer
            .render_at(&Unserializable, &FakeOrgs::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serialize(_)));
        assert!(err.to_string().contains("no representation"));
    }

    #[tokio::test]
    async fn missing_field_is_an_error() {
        let err = render("{{.nope}}", false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Template(TemplateError::MissingField(ref p)) if p == ".nope"
        ));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            Renderer::new("id {{.id", false).unwrap_err(),
            TemplateError::Unclosed(3)
        );
        assert_eq!(
            Renderer::new("{{ }}", false).unwrap_err(),
            TemplateError::Empty(0)
        );
        assert!(matches!(
            Renderer::new("{{printf .id}}", false).unwrap_err(),
            TemplateError::Unknown(_)
        ));
        assert!(!Renderer::new("plain", true).unwrap().uses_lookup());
    }
}
