use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declared content type of a stored payload (e.g. `text/plain`).
///
/// The store never interprets payloads; the media type travels with the
/// value so that `retrieve` can hand it back unchanged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    pub const ANY: &'static str = "*/*";
    pub const TEXT_PLAIN: &'static str = "text/plain";
    pub const APPLICATION_JSON: &'static str = "application/json";
    pub const OCTET_STREAM: &'static str = "application/octet-stream";

    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    pub fn any() -> Self {
        Self::new(Self::ANY)
    }

    pub fn text() -> Self {
        Self::new(Self::TEXT_PLAIN)
    }

    pub fn json() -> Self {
        Self::new(Self::APPLICATION_JSON)
    }

    pub fn octet_stream() -> Self {
        Self::new(Self::OCTET_STREAM)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaType({})", self.0)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payload together with its declared media type.
///
/// A `TypedValue` always carries a payload: absence of a value is modelled
/// as `Option<TypedValue>` at the API boundary, never as an empty
/// `TypedValue`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    data: Vec<u8>,
    media_type: MediaType,
}

impl TypedValue {
    /// Wrap raw bytes with an explicit media type.
    pub fn new(data: impl Into<Vec<u8>>, media_type: MediaType) -> Self {
        Self {
            data: data.into(),
            media_type,
        }
    }

    /// A UTF-8 text payload (`text/plain`).
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), MediaType::text())
    }

    /// Opaque bytes (`application/octet-stream`).
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, MediaType::octet_stream())
    }

    /// Serialize `value` as JSON (`application/json`).
    pub fn json<T: Serialize>(value: &T) -> Result<Self, TypeError> {
        let data =
            serde_json::to_vec(value).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self::new(data, MediaType::json()))
    }

    /// Decode a JSON payload.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        serde_json::from_slice(&self.data).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TypedValue");
        match self.as_text() {
            Some(text) if text.len() <= 64 => s.field("data", &text),
            _ => s.field("len", &self.data.len()),
        };
        s.field("media_type", &self.media_type.as_str()).finish()
    }
}

impl From<&str> for TypedValue {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for TypedValue {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}
