//! Write payloads and write outcomes.
//!
//! A write carries a primary record and an optional related (class-specific)
//! record. Attribute values are either text or an explicit null marker; a
//! field that should not be touched is simply absent from the set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry message for an update that would not change any column.
pub const NO_VALUES_TO_UPDATE: &str = "There are no values to update";

/// Registry message fragment for an update identical to the stored record.
pub const SUPERFLUOUS_UPDATE: &str = "Superfluous entity record update detected";

/// Check whether a registry failure message only reports that nothing changed.
#[must_use]
pub fn is_benign_no_change(message: &str) -> bool {
    message == NO_VALUES_TO_UPDATE || message.contains(SUPERFLUOUS_UPDATE)
}

/// Value of a single attribute in a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicitly unset the field on the destination.
    Null,
    Text(String),
}

impl AttributeValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Null => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

/// Ordered set of attributes for one record in a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    attributes: BTreeMap<String, AttributeValue>,
}

impl AttributeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style text attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Mark a field for explicit removal.
    pub fn set_null(&mut self, name: impl Into<String>) {
        self.attributes.insert(name.into(), AttributeValue::Null);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Text value of an attribute, `None` when absent or null.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_text)
    }

    #[must_use]
    pub fn is_null(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(AttributeValue::is_null)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Action applied to the related record of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedAction {
    Insert,
    Update,
}

impl RelatedAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedAction::Insert => "insert",
            RelatedAction::Update => "update",
        }
    }
}

impl std::fmt::Display for RelatedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Class-specific record written alongside the primary entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRecord {
    pub relationship: String,
    pub action: RelatedAction,
    pub record: AttributeSet,
}

impl RelatedRecord {
    #[must_use]
    pub fn new(relationship: impl Into<String>, action: RelatedAction, record: AttributeSet) -> Self {
        Self {
            relationship: relationship.into(),
            action,
            record,
        }
    }
}

/// A single add or update call against a registry entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityWrite {
    pub entity: String,
    pub primary: AttributeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedRecord>,
}

impl EntityWrite {
    #[must_use]
    pub fn new(entity: impl Into<String>, primary: AttributeSet) -> Self {
        Self {
            entity: entity.into(),
            primary,
            related: None,
        }
    }

    #[must_use]
    pub fn with_related(mut self, related: RelatedRecord) -> Self {
        self.related = Some(related);
        self
    }
}

/// Result of an update the registry accepted or declined as a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The registry changed at least one column.
    Applied,
    /// The registry reported that nothing needed changing.
    NoChange { message: String },
}

impl WriteOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Result of a relationship association call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationOutcome {
    Associated,
    /// The registry refused because the relationship already exists.
    AlreadyExists,
}
