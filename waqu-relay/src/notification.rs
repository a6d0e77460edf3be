//! Partial view of WhatsApp Cloud API webhook notifications.
//!
//! Only the path `entry[].changes[].value.messages[]` is modelled. Every other
//! field is ignored, and the message objects themselves are never inspected.
//! Keys match case-insensitively (`"Entry"` is `entry`) and a `null` object
//! reads as an empty one, the same leniency senders get from Go's `encoding/json`.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;

/// Webhook notification, projected down to what classification needs.
#[derive(Debug, Default)]
pub struct WebhookNotification {
    pub entry: Option<Vec<Entry>>,
}

#[derive(Debug, Default)]
pub struct Entry {
    pub changes: Option<Vec<Change>>,
}

#[derive(Debug, Default)]
pub struct Change {
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Default)]
pub struct ChangeValue {
    pub messages: Option<Vec<IgnoredAny>>,
}

impl<'de> Deserialize<'de> for WebhookNotification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FoldedField::read(deserializer, "entry").map(|entry| Self { entry })
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FoldedField::read(deserializer, "changes").map(|changes| Self { changes })
    }
}

impl<'de> Deserialize<'de> for Change {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FoldedField::read(deserializer, "value").map(|value| Self { value })
    }
}

impl<'de> Deserialize<'de> for ChangeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FoldedField::read(deserializer, "messages").map(|messages| Self { messages })
    }
}

/// Reads one named field out of an object, ignoring all others.
///
/// `name` must be lowercase ASCII. When the key occurs more than once the last
/// occurrence wins.
struct FoldedField<T> {
    name: &'static str,
    marker: PhantomData<T>,
}

impl<T> FoldedField<T> {
    fn read<'de, D>(deserializer: D, name: &'static str) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        deserializer.deserialize_any(FoldedField {
            name,
            marker: PhantomData,
        })
    }
}

impl<'de, T: Deserialize<'de>> Visitor<'de> for FoldedField<T> {
    type Value = Option<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut found = None;
        while let Some(key) = map.next_key::<String>()? {
            if key_matches(&key, self.name) {
                found = map.next_value::<Option<T>>()?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// Case-insensitive key comparison against a lowercase ASCII field name.
///
/// Besides ASCII case, the Kelvin sign and long s fold to `k` and `s`.
fn key_matches(key: &str, name: &str) -> bool {
    key.chars()
        .map(|c| match c {
            '\u{212A}' => 'k',
            '\u{017F}' => 's',
            c => c.to_ascii_lowercase(),
        })
        .eq(name.chars())
}

impl WebhookNotification {
    /// Decode the first JSON value in `body`.
    ///
    /// Bytes after a complete top-level object are not examined, so a stray
    /// trailing character does not make an otherwise valid notification unreadable.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<Self>();
        match stream.next() {
            Some(result) => result,
            None => Err(serde::de::Error::custom("empty body")),
        }
    }

    /// True if any change in any entry carries at least one message.
    pub fn has_messages(&self) -> bool {
        self.entry
            .iter()
            .flatten()
            .flat_map(|entry| entry.changes.iter().flatten())
            .filter_map(|change| change.value.as_ref())
            .any(|value| value.messages.as_ref().is_some_and(|m| !m.is_empty()))
    }
}

/// Decide whether a raw webhook body is a user message event.
///
/// Bodies that do not decode as a notification are not message events; this
/// never fails.
pub fn is_message_event(body: &[u8]) -> bool {
    WebhookNotification::from_body(body)
        .map(|notification| notification.has_messages())
        .unwrap_or(false)
}
