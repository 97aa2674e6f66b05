//! Core types for the subscription index.

use crate::error::{Result, SubscriptionError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of every reverse index key, keeping them apart from channel ids.
pub const REVERSE_KEY_PREFIX: &str = "space:";

/// A channel's subscription to events of one wiki space.
///
/// Field names on the wire follow the layout the chat plugin has always
/// written (`channelID`, `baseURL`, `spaceKey`), so bare records from before
/// schema versioning still decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique within the owning channel.
    pub alias: String,

    #[serde(rename = "channelID", alias = "channelId", default)]
    pub channel_id: String,

    /// Identifies the wiki server instance.
    #[serde(rename = "baseURL", alias = "baseUrl")]
    pub base_url: String,

    /// Identifies the space within the wiki instance.
    #[serde(rename = "spaceKey")]
    pub space_key: String,

    /// Event types this subscription reacts to, in insertion order.
    #[serde(default)]
    pub events: Vec<String>,

    /// Kind of subscription chosen in the plugin's form (space or page).
    #[serde(
        rename = "subscriptionType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_type: Option<String>,

    /// Page the subscription is narrowed to, if any.
    #[serde(rename = "pageID", default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
}

impl Subscription {
    pub fn new<I, S>(
        alias: impl Into<String>,
        channel_id: impl Into<String>,
        base_url: impl Into<String>,
        space_key: impl Into<String>,
        events: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alias: alias.into(),
            channel_id: channel_id.into(),
            base_url: base_url.into(),
            space_key: space_key.into(),
            events: events.into_iter().map(Into::into).collect(),
            subscription_type: None,
            page_id: None,
        }
    }

    /// Reverse index key for this subscription's target space.
    pub fn reverse_key(&self) -> Result<ReverseKey> {
        ReverseKey::derive(&self.base_url, &self.space_key)
    }

    /// Trim and validate user input.
    ///
    /// Duplicate events are dropped, keeping the first occurrence.
    pub fn normalized(self) -> Result<Self> {
        let alias = required("alias", &self.alias)?;
        let channel_id = required("channel id", &self.channel_id)?;
        let base_url = required("base URL", &self.base_url)?;
        let space_key = required("space key", &self.space_key)?;

        let mut events: Vec<String> = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let event = event.trim();
            if event.is_empty() {
                return Err(SubscriptionError::InvalidSubscription(
                    "event names must not be empty".into(),
                ));
            }
            if !events.iter().any(|e| e == event) {
                events.push(event.to_string());
            }
        }
        if events.is_empty() {
            return Err(SubscriptionError::InvalidSubscription(
                "at least one event is required".into(),
            ));
        }

        Ok(Self {
            alias,
            channel_id,
            base_url,
            space_key,
            events,
            ..self
        })
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SubscriptionError::InvalidSubscription(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// KV key of a reverse index entry, derived from `(base_url, space_key)`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReverseKey(String);

impl ReverseKey {
    /// Derive the key for a wiki space.
    ///
    /// Base URLs differing only in a trailing slash or in the case of the
    /// scheme and host address the same space.
    pub fn derive(base_url: &str, space_key: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        let space_key = space_key.trim();
        if base_url.is_empty() || space_key.is_empty() {
            return Err(SubscriptionError::InvalidSubscription(
                "base URL and space key are both required".into(),
            ));
        }

        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        let mut hasher = Sha256::new();
        hasher.update((base_url.len() as u64).to_le_bytes());
        hasher.update(base_url.as_bytes());
        hasher.update((space_key.len() as u64).to_le_bytes());
        hasher.update(space_key.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        Ok(ReverseKey(format!("{REVERSE_KEY_PREFIX}{}", hex::encode(digest))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReverseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReverseKey({})", self.0)
    }
}

impl fmt::Display for ReverseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim, drop trailing slashes and lower-case.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_lowercase()
}

/// Channel index entry: `alias -> Subscription` for one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSubscriptions(BTreeMap<String, Subscription>);

impl ChannelSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&Subscription> {
        self.0.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.0.contains_key(alias)
    }

    /// Insert keyed by the subscription's alias, returning any replaced record.
    pub fn insert(&mut self, subscription: Subscription) -> Option<Subscription> {
        self.0.insert(subscription.alias.clone(), subscription)
    }

    pub fn remove(&mut self, alias: &str) -> Option<Subscription> {
        self.0.remove(alias)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records in alias order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.0.values()
    }

    pub fn into_vec(self) -> Vec<Subscription> {
        self.0.into_values().collect()
    }

    /// Fill in fields that bare legacy entries may have left empty.
    pub(crate) fn backfill(&mut self, channel_id: &str) {
        for (alias, subscription) in self.0.iter_mut() {
            if subscription.alias.is_empty() {
                subscription.alias = alias.clone();
            }
            if subscription.channel_id.is_empty() {
                subscription.channel_id = channel_id.to_string();
            }
        }
    }

    /// The events this channel wants for `key`: the ordered union over every
    /// record targeting it, or `None` when no record does.
    pub fn events_for(&self, key: &ReverseKey) -> Option<Vec<String>> {
        let mut events: Option<Vec<String>> = None;
        for subscription in self.iter() {
            if subscription.reverse_key().ok().as_ref() != Some(key) {
                continue;
            }
            let merged = events.get_or_insert_with(Vec::new);
            for event in &subscription.events {
                if !merged.contains(event) {
                    merged.push(event.clone());
                }
            }
        }
        events
    }

    /// Every distinct space targeted by this channel, with the first record
    /// (in alias order) that targets it.
    pub fn targets(&self) -> BTreeMap<ReverseKey, &Subscription> {
        let mut targets = BTreeMap::new();
        for subscription in self.iter() {
            if let Ok(key) = subscription.reverse_key() {
                targets.entry(key).or_insert(subscription);
            }
        }
        targets
    }
}

/// Reverse index entry: `channel id -> events` for one wiki space.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceSubscribers(BTreeMap<String, Vec<String>>);

impl SpaceSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str) -> Option<&[String]> {
        self.0.get(channel_id).map(Vec::as_slice)
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.0.contains_key(channel_id)
    }

    pub fn set(&mut self, channel_id: impl Into<String>, events: Vec<String>) {
        self.0.insert(channel_id.into(), events);
    }

    pub fn remove(&mut self, channel_id: &str) -> Option<Vec<String>> {
        self.0.remove(channel_id)
    }

    /// Make the entry for `channel_id` match `events`, removing it on `None`.
    ///
    /// Returns whether anything changed.
    pub fn sync_channel(&mut self, channel_id: &str, events: Option<Vec<String>>) -> bool {
        match events {
            Some(events) => {
                if self.get(channel_id) == Some(events.as_slice()) {
                    return false;
                }
                self.set(channel_id, events);
                true
            }
            None => self.remove(channel_id).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(c, e)| (c.as_str(), e.as_slice()))
    }

    /// Channels that asked for `event`.
    pub fn channels_for_event(&self, event: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, events)| events.iter().any(|e| e == event))
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

/// A disagreement between a channel's records and the reverse index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexDrift {
    /// The reverse entry for a targeted space does not list the channel.
    MissingChannel {
        reverse_key: ReverseKey,
        base_url: String,
        space_key: String,
    },
    /// The reverse entry lists the channel with the wrong events.
    EventMismatch {
        reverse_key: ReverseKey,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl IndexDrift {
    pub fn reverse_key(&self) -> &ReverseKey {
        match self {
            IndexDrift::MissingChannel { reverse_key, .. } => reverse_key,
            IndexDrift::EventMismatch { reverse_key, .. } => reverse_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_key_is_stable() {
        let a = ReverseKey::derive("https://wiki.example.com", "ENG").unwrap();
        let b = ReverseKey::derive("https://wiki.example.com", "ENG").unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(REVERSE_KEY_PREFIX));
        assert_eq!(a.as_str().len(), REVERSE_KEY_PREFIX.len() + 64);
    }

    #[test]
    fn test_reverse_key_normalizes_base_url() {
        let a = ReverseKey::derive("https://Wiki.Example.com/", "ENG").unwrap();
        let b = ReverseKey::derive("  https://wiki.example.com ", " ENG ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reverse_key_folds_url_case_but_keeps_space_case() {
        let a = ReverseKey::derive("https://w/Wiki", "ENG").unwrap();
        let b = ReverseKey::derive("https://w/wiki", "ENG").unwrap();
        assert_eq!(a, b);
        assert_eq!(normalize_base_url(" HTTPS://W/Wiki/ "), "https://w/wiki");

        let c = ReverseKey::derive("https://w", "eng").unwrap();
        let d = ReverseKey::derive("https://w", "ENG").unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn test_reverse_key_no_concatenation_collision() {
        let a = ReverseKey::derive("https://w/a", "bc").unwrap();
        let b = ReverseKey::derive("https://w/ab", "c").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reverse_key_rejects_empty() {
        assert!(ReverseKey::derive("", "ENG").is_err());
        assert!(ReverseKey::derive("https://w", "  ").is_err());
        assert!(ReverseKey::derive("///", "ENG").is_err());
    }

    #[test]
    fn test_normalized_dedupes_events() {
        let sub = Subscription::new(
            " a1 ",
            "C1",
            "https://w",
            "ENG",
            ["page_created", " page_updated", "page_created"],
        )
        .normalized()
        .unwrap();
        assert_eq!(sub.alias, "a1");
        assert_eq!(sub.events, vec!["page_created", "page_updated"]);
    }

    #[test]
    fn test_normalized_rejects_missing_fields() {
        let no_events = Subscription::new("a1", "C1", "https://w", "ENG", Vec::<String>::new());
        assert!(matches!(
            no_events.normalized(),
            Err(SubscriptionError::InvalidSubscription(_))
        ));

        let no_alias = Subscription::new("", "C1", "https://w", "ENG", ["page_created"]);
        assert!(no_alias.normalized().is_err());

        let blank_event = Subscription::new("a1", "C1", "https://w", "ENG", ["page_created", " "]);
        assert!(blank_event.normalized().is_err());
    }

    #[test]
    fn test_events_for_unions_aliases_on_same_space() {
        let mut channel = ChannelSubscriptions::new();
        channel.insert(Subscription::new("a", "C1", "https://w", "ENG", ["page_created"]));
        channel.insert(Subscription::new(
            "b",
            "C1",
            "https://w/",
            "ENG",
            ["page_updated", "page_created"],
        ));
        channel.insert(Subscription::new("c", "C1", "https://w", "OPS", ["page_removed"]));

        let eng = ReverseKey::derive("https://w", "ENG").unwrap();
        assert_eq!(
            channel.events_for(&eng),
            Some(vec!["page_created".to_string(), "page_updated".to_string()])
        );

        let other = ReverseKey::derive("https://x", "ENG").unwrap();
        assert_eq!(channel.events_for(&other), None);
        assert_eq!(channel.targets().len(), 2);
    }

    #[test]
    fn test_sync_channel() {
        let mut subscribers = SpaceSubscribers::new();
        assert!(subscribers.sync_channel("C1", Some(vec!["page_created".into()])));
        assert!(!subscribers.sync_channel("C1", Some(vec!["page_created".into()])));
        assert!(subscribers.sync_channel("C1", None));
        assert!(!subscribers.sync_channel("C1", None));
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_channels_for_event() {
        let mut subscribers = SpaceSubscribers::new();
        subscribers.set("C1", vec!["page_created".into()]);
        subscribers.set("C2", vec!["page_updated".into(), "page_created".into()]);
        subscribers.set("C3", vec!["comment_created".into()]);

        assert_eq!(subscribers.channels_for_event("page_created"), vec!["C1", "C2"]);
        assert!(subscribers.channels_for_event("page_removed").is_empty());
    }

    #[test]
    fn test_backfill_legacy_fields() {
        let mut channel: ChannelSubscriptions = serde_json::from_str(
            r#"{"a1": {"alias": "", "baseURL": "https://w", "spaceKey": "ENG", "events": ["page_created"]}}"#,
        )
        .unwrap();
        channel.backfill("C1");
        let sub = channel.get("a1").unwrap();
        assert_eq!(sub.alias, "a1");
        assert_eq!(sub.channel_id, "C1");
    }
}
