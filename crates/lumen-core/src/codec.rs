// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire codec: encode/decode envelopes between the object form
//! `{"ref":..,"join_ref":..,"topic":..,"event":..,"payload":..}` and the
//! Phoenix-style tuple form `[join_ref, ref, topic, event, payload]`.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};

/// Which shape [`Codec::encode`] emits by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireShape {
    /// `[join_ref, ref, topic, event, payload]`.
    #[default]
    Tuple,
    /// `{"ref":..,"join_ref":..,"topic":..,"event":..,"payload":..}`.
    Object,
}

/// Codec configuration. The only knob today is the default encode shape —
/// decode always accepts both.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecConfig {
    pub shape: WireShape,
}

/// A single logical message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    pub topic: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Json>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, event: impl Into<String>) -> Self {
        Self { join_ref: None, r#ref: None, topic: topic.into(), event: event.into(), payload: None }
    }

    pub fn with_ref(mut self, r#ref: impl Into<String>) -> Self {
        self.r#ref = Some(r#ref.into());
        self
    }

    pub fn with_join_ref(mut self, join_ref: impl Into<String>) -> Self {
        self.join_ref = Some(join_ref.into());
        self
    }

    pub fn with_payload(mut self, payload: Json) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Stateless encoder/decoder for the envelope wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    pub config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Decode raw bytes into an [`Envelope`], accepting either wire shape.
    ///
    /// Fails with [`Error::MalformedFrame`] on non-JSON input or wrong tuple
    /// arity, and [`Error::FieldType`] when `topic`/`event` aren't strings or
    /// `payload` isn't null/object.
    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        let value: Json = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedFrame(format!("invalid json: {e}")))?;

        match value {
            Json::Array(items) => decode_tuple(items),
            Json::Object(_) => decode_object(value),
            _ => Err(Error::MalformedFrame("expected array or object".to_owned())),
        }
    }

    /// Encode an [`Envelope`] into the configured wire shape.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let json = match self.config.shape {
            WireShape::Object => encode_object(envelope),
            WireShape::Tuple => encode_tuple(envelope),
        };
        serde_json::to_vec(&json).map_err(|e| Error::MalformedFrame(e.to_string()))
    }
}

fn ref_to_string(value: &Json) -> Result<Option<String>> {
    match value {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s.clone())),
        Json::Number(n) => Ok(Some(n.to_string())),
        _ => Err(Error::FieldType("ref/join_ref must be null, string, or integer".to_owned())),
    }
}

fn require_string(value: &Json, field: &str) -> Result<String> {
    value.as_str().map(str::to_owned).ok_or_else(|| Error::FieldType(format!("{field} must be a string")))
}

fn require_payload(value: Json, field: &str) -> Result<Option<Json>> {
    match value {
        Json::Null => Ok(None),
        Json::Object(_) => Ok(Some(value)),
        _ => Err(Error::FieldType(format!("{field} must be null or an object"))),
    }
}

fn decode_tuple(items: Vec<Json>) -> Result<Envelope> {
    let [join_ref, r#ref, topic, event, payload]: [Json; 5] = items
        .try_into()
        .map_err(|items: Vec<Json>| Error::MalformedFrame(format!("expected 5-tuple, got {}", items.len())))?;

    Ok(Envelope {
        join_ref: ref_to_string(&join_ref)?,
        r#ref: ref_to_string(&r#ref)?,
        topic: require_string(&topic, "topic")?,
        event: require_string(&event, "event")?,
        payload: require_payload(payload, "payload")?,
    })
}

fn decode_object(value: Json) -> Result<Envelope> {
    let Json::Object(mut map) = value else {
        return Err(Error::MalformedFrame("expected object".to_owned()));
    };

    let join_ref = map.remove("join_ref").unwrap_or(Json::Null);
    let r#ref = map.remove("ref").unwrap_or(Json::Null);
    let topic = map.remove("topic").ok_or_else(|| Error::FieldType("missing topic".to_owned()))?;
    let event = map.remove("event").ok_or_else(|| Error::FieldType("missing event".to_owned()))?;
    let payload = map.remove("payload").unwrap_or(Json::Null);

    Ok(Envelope {
        join_ref: ref_to_string(&join_ref)?,
        r#ref: ref_to_string(&r#ref)?,
        topic: require_string(&topic, "topic")?,
        event: require_string(&event, "event")?,
        payload: require_payload(payload, "payload")?,
    })
}

fn encode_tuple(envelope: &Envelope) -> Json {
    Json::Array(vec![
        envelope.join_ref.clone().map(Json::String).unwrap_or(Json::Null),
        envelope.r#ref.clone().map(Json::String).unwrap_or(Json::Null),
        Json::String(envelope.topic.clone()),
        Json::String(envelope.event.clone()),
        envelope.payload.clone().unwrap_or(Json::Null),
    ])
}

fn encode_object(envelope: &Envelope) -> Json {
    // Stable field ordering: ref, join_ref, topic, event, payload.
    let mut map = serde_json::Map::new();
    map.insert("ref".to_owned(), envelope.r#ref.clone().map(Json::String).unwrap_or(Json::Null));
    map.insert(
        "join_ref".to_owned(),
        envelope.join_ref.clone().map(Json::String).unwrap_or(Json::Null),
    );
    map.insert("topic".to_owned(), Json::String(envelope.topic.clone()));
    map.insert("event".to_owned(), Json::String(envelope.event.clone()));
    map.insert("payload".to_owned(), envelope.payload.clone().unwrap_or(Json::Null));
    Json::Object(map)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
