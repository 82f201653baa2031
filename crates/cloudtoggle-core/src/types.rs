use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ResourceKind
// ---------------------------------------------------------------------------

/// Category of cloud resource a binding targets.
///
/// Open-ended on purpose: the controller registry decides which kinds are
/// actionable, so an unrecognised kind still round-trips through storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub const COMPUTE: &'static str = "EC2";
    pub const CONTAINER: &'static str = "ECS";
    pub const DATABASE: &'static str = "RDS";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn compute() -> Self {
        Self::new(Self::COMPUTE)
    }

    pub fn container() -> Self {
        Self::new(Self::CONTAINER)
    }

    pub fn database() -> Self {
        Self::new(Self::DATABASE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Tag / TagSelector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered list of `(key, value)` pairs that must all match a resource's
/// live tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSelector(Vec<Tag>);

impl TagSelector {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self(tags)
    }

    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self(vec![Tag::new(key, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }

    /// Whether `live` satisfies every pair of the selector.
    ///
    /// An empty selector never matches. A selector that repeats a key with
    /// two different values can never match either, since a resource holds
    /// one value per key.
    pub fn matches(&self, live: &HashMap<String, String>) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0
            .iter()
            .all(|t| live.get(&t.key).is_some_and(|v| *v == t.value))
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Tag::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

// ---------------------------------------------------------------------------
// ResourceBinding / ResourceGroup
// ---------------------------------------------------------------------------

/// One resource kind's tag selector attached to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(default)]
    pub tags: TagSelector,
}

impl ResourceBinding {
    pub fn new(kind: impl Into<ResourceKind>, tags: TagSelector) -> Self {
        Self {
            kind: kind.into(),
            tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    /// Free-form operator label; not interpreted by the engine.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resources: Vec<ResourceBinding>,
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Stop,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_requires_every_pair() {
        let sel = TagSelector::new(vec![Tag::new("env", "dev"), Tag::new("team", "core")]);
        assert!(sel.matches(&live(&[("env", "dev"), ("team", "core"), ("x", "y")])));
        assert!(!sel.matches(&live(&[("env", "dev")])));
        assert!(!sel.matches(&live(&[("env", "prod"), ("team", "core")])));
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let sel = TagSelector::default();
        assert!(!sel.matches(&live(&[("env", "dev")])));
        assert!(!sel.matches(&HashMap::new()));
    }

    #[test]
    fn conflicting_duplicate_keys_are_unsatisfiable() {
        let sel = TagSelector::new(vec![Tag::new("env", "dev"), Tag::new("env", "prod")]);
        assert!(!sel.matches(&live(&[("env", "dev")])));
        assert!(!sel.matches(&live(&[("env", "prod")])));
    }

    #[test]
    fn binding_serializes_with_type_field() {
        let b = ResourceBinding::new("EC2", TagSelector::single("env", "dev"));
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "EC2");
        assert_eq!(json["tags"][0]["key"], "env");
        assert_eq!(json["tags"][0]["value"], "dev");
    }

    #[test]
    fn action_kind_uses_snake_case() {
        assert_eq!(serde_json::to_value(ActionKind::Stop).unwrap(), "stop");
        assert_eq!(ActionKind::Start.to_string(), "start");
    }
}
