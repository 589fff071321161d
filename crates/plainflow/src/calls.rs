//! Call bodies produced by the host hooks.

use chrono::{DateTime, Utc};
use payload_normalizer::{CallPath, Envelope, HostContext};
use serde_json::{Map, Value};

/// A host call that becomes one envelope.
pub trait Call {
    const PATH: CallPath;

    /// Build the un-normalized envelope.
    fn into_envelope(self, host: &dyn HostContext) -> Envelope;
}

fn base(timestamp: Option<DateTime<Utc>>, options: Option<Map<String, Value>>) -> Envelope {
    Envelope {
        timestamp: Some(timestamp.unwrap_or_else(Utc::now)),
        options,
        ..Envelope::default()
    }
}

/// `page(category, name, properties, options)`
#[derive(Debug, Clone, Default)]
pub struct PageCall {
    pub category: Option<String>,
    pub name: Option<String>,
    pub properties: Map<String, Value>,
    pub options: Option<Map<String, Value>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PageCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

impl Call for PageCall {
    const PATH: CallPath = CallPath::Page;

    fn into_envelope(self, _host: &dyn HostContext) -> Envelope {
        let mut envelope = base(self.timestamp, self.options)
            .with_field("properties", Value::Object(self.properties));
        if let Some(name) = self.name {
            envelope = envelope.with_field("name", name);
        }
        if let Some(category) = self.category {
            envelope = envelope.with_field("category", category);
        }
        envelope
    }
}

/// `identify(userId, traits, options)`
#[derive(Debug, Clone, Default)]
pub struct IdentifyCall {
    /// Falls back to the host's known user id during normalization.
    pub user_id: Option<String>,
    pub traits: Map<String, Value>,
    pub options: Option<Map<String, Value>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl IdentifyCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn trait_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

impl Call for IdentifyCall {
    const PATH: CallPath = CallPath::Identify;

    fn into_envelope(self, _host: &dyn HostContext) -> Envelope {
        let mut envelope =
            base(self.timestamp, self.options).with_field("traits", Value::Object(self.traits));
        envelope.user_id = self.user_id;
        envelope
    }
}

/// `track(event, properties, options)`
#[derive(Debug, Clone, Default)]
pub struct TrackCall {
    pub event: String,
    pub properties: Map<String, Value>,
    pub options: Option<Map<String, Value>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackCall {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

impl Call for TrackCall {
    const PATH: CallPath = CallPath::Track;

    fn into_envelope(self, _host: &dyn HostContext) -> Envelope {
        base(self.timestamp, self.options)
            .with_field("event", self.event)
            .with_field("properties", Value::Object(self.properties))
    }
}

/// `group(groupId, traits, options)`
#[derive(Debug, Clone, Default)]
pub struct GroupCall {
    pub group_id: String,
    pub traits: Map<String, Value>,
    pub options: Option<Map<String, Value>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl GroupCall {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn trait_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

impl Call for GroupCall {
    const PATH: CallPath = CallPath::Group;

    fn into_envelope(self, _host: &dyn HostContext) -> Envelope {
        base(self.timestamp, self.options)
            .with_field("groupId", self.group_id)
            .with_field("traits", Value::Object(self.traits))
    }
}

/// `alias(to, from)`
#[derive(Debug, Clone, Default)]
pub struct AliasCall {
    pub to: String,
    /// Previous id. Falls back to the known user id, then the anonymous id.
    pub from: Option<String>,
    pub options: Option<Map<String, Value>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl AliasCall {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

impl Call for AliasCall {
    const PATH: CallPath = CallPath::Alias;

    fn into_envelope(self, host: &dyn HostContext) -> Envelope {
        let previous_id = self
            .from
            .filter(|from| !from.is_empty())
            .or_else(|| host.user_id())
            .unwrap_or_else(|| host.anonymous_id());

        let mut envelope = base(self.timestamp, self.options).with_field("previousId", previous_id);
        envelope.user_id = Some(self.to);
        envelope
    }
}
