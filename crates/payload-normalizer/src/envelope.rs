//! Envelope and context types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical endpoint selector for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallPath {
    #[serde(rename = "/p")]
    Page,
    #[serde(rename = "/i")]
    Identify,
    #[serde(rename = "/t")]
    Track,
    #[serde(rename = "/g")]
    Group,
    #[serde(rename = "/a")]
    Alias,
}

impl CallPath {
    pub const ALL: [CallPath; 5] = [
        CallPath::Page,
        CallPath::Identify,
        CallPath::Track,
        CallPath::Group,
        CallPath::Alias,
    ];

    /// Path segment appended to the collection URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPath::Page => "/p",
            CallPath::Identify => "/i",
            CallPath::Track => "/t",
            CallPath::Group => "/g",
            CallPath::Alias => "/a",
        }
    }
}

impl fmt::Display for CallPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown call path: {0}")]
pub struct UnknownCallPath(pub String);

impl FromStr for CallPath {
    type Err = UnknownCallPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "/p" | "p" | "page" => Ok(CallPath::Page),
            "/i" | "i" | "identify" => Ok(CallPath::Identify),
            "/t" | "t" | "track" => Ok(CallPath::Track),
            "/g" | "g" | "group" => Ok(CallPath::Group),
            "/a" | "a" | "alias" => Ok(CallPath::Alias),
            other => Err(UnknownCallPath(other.to_string())),
        }
    }
}

/// Library that produced the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub version: String,
}

/// UTM-derived campaign fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Campaign {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.source.is_none()
            && self.medium.is_none()
            && self.term.is_none()
            && self.content.is_none()
            && self.extra.is_empty()
    }

    /// Fill sub-fields missing here from `derived`. Existing values win.
    pub fn fill_from(&mut self, derived: Campaign) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.name, derived.name);
        fill(&mut self.source, derived.source);
        fill(&mut self.medium, derived.medium);
        fill(&mut self.term, derived.term);
        fill(&mut self.content, derived.content);
        for (key, value) in derived.extra {
            self.extra.entry(key).or_insert(value);
        }
    }
}

/// Visitor referral record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referrer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amp {
    pub id: String,
}

/// Page location details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Context attached to every envelope. Unknown caller keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<Campaign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<Referrer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp: Option<Amp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Context {
    /// Build a context from free-form caller options.
    ///
    /// Recognized keys are parsed into their typed slots. If a recognized key
    /// has an unexpected shape the whole map is kept verbatim in `extra`.
    pub fn from_map(map: Map<String, Value>) -> Self {
        match serde_json::from_value::<Context>(Value::Object(map.clone())) {
            Ok(context) => context,
            Err(_) => Context {
                extra: map,
                ..Context::default()
            },
        }
    }
}

/// Bundling metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundled: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unbundled: Vec<String>,
}

/// The unit of delivery.
///
/// Call-specific fields (`event`, `properties`, `traits`, `groupId`,
/// `previousId`, `name`, `category`, ...) live in `fields`; the shared fields
/// are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a call-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Build from an arbitrary JSON object.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_path_strings() {
        for path in CallPath::ALL {
            assert_eq!(path.as_str().parse::<CallPath>().unwrap(), path);
            assert_eq!(path.to_string(), path.as_str());
        }
        assert_eq!("track".parse::<CallPath>().unwrap(), CallPath::Track);
        assert!("/x".parse::<CallPath>().is_err());
    }

    #[test]
    fn test_call_path_serde() {
        assert_eq!(serde_json::to_value(CallPath::Track).unwrap(), json!("/t"));
        let parsed: CallPath = serde_json::from_value(json!("/a")).unwrap();
        assert_eq!(parsed, CallPath::Alias);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new()
            .with_user_id("id")
            .with_field("event", "my-event")
            .with_field("properties", json!({}));

        let value = envelope.to_value().unwrap();
        assert_eq!(value["userId"], "id");
        assert_eq!(value["event"], "my-event");
        assert!(value.get("anonymousId").is_none());
        assert!(value.get("_metadata").is_none());
    }

    #[test]
    fn test_envelope_keeps_unknown_fields() {
        let value = json!({
            "userId": "uid",
            "groupId": "gid",
            "traits": { "plan": "pro" },
            "_metadata": { "bundled": ["Plainflow"] }
        });
        let envelope = Envelope::from_value(value).unwrap();
        assert_eq!(envelope.user_id.as_deref(), Some("uid"));
        assert_eq!(envelope.field("groupId"), Some(&json!("gid")));
        assert_eq!(envelope.metadata.unwrap().bundled, vec!["Plainflow"]);
    }

    #[test]
    fn test_referrer_type_rename() {
        let referrer: Referrer =
            serde_json::from_str(r#"{"id":"baz","type":"millennial-media"}"#).unwrap();
        assert_eq!(referrer.kind, "millennial-media");
        assert_eq!(
            serde_json::to_string(&referrer).unwrap(),
            r#"{"id":"baz","type":"millennial-media"}"#
        );
    }

    #[test]
    fn test_context_from_map_parses_known_keys() {
        let map = json!({
            "opt": true,
            "library": { "name": "analytics-wordpress", "version": "1.0.3" }
        });
        let Value::Object(map) = map else { unreachable!() };

        let context = Context::from_map(map);
        assert_eq!(context.library.unwrap().name, "analytics-wordpress");
        assert_eq!(context.extra.get("opt"), Some(&json!(true)));
    }

    #[test]
    fn test_context_from_map_malformed_known_key() {
        let Value::Object(map) = json!({ "library": "not-an-object", "opt": 1 }) else {
            unreachable!()
        };
        let context = Context::from_map(map);
        assert!(context.library.is_none());
        assert_eq!(context.extra.get("library"), Some(&json!("not-an-object")));
        assert_eq!(context.extra.get("opt"), Some(&json!(1)));
    }

    #[test]
    fn test_campaign_fill_from_is_field_by_field() {
        let mut campaign = Campaign {
            source: Some("overrideSource".into()),
            ..Campaign::default()
        };
        campaign.fill_from(Campaign {
            name: Some("name".into()),
            source: Some("source".into()),
            medium: Some("medium".into()),
            ..Campaign::default()
        });

        assert_eq!(campaign.source.as_deref(), Some("overrideSource"));
        assert_eq!(campaign.name.as_deref(), Some("name"));
        assert_eq!(campaign.medium.as_deref(), Some("medium"));
        assert!(campaign.term.is_none());
    }
}
