//! Model records as reported by backends.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// A model reported by a backend's `/v1/models`.
///
/// The backend's JSON object is kept verbatim and re-served as-is; only the
/// identifier is extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    id: String,
    raw: Value,
}

impl Model {
    /// Wrap a raw model object. Returns `None` when it has neither a
    /// non-empty `id` nor a non-empty `name`.
    pub fn from_value(raw: Value) -> Option<Self> {
        let id = string_field(&raw, "id").or_else(|| string_field(&raw, "name"))?;
        Some(Self {
            id: id.to_string(),
            raw,
        })
    }

    /// Identifier used for deduplication and routing (`id`, else `name`).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// True if the backend would serve a request for `model` with this
    /// record, matching either its `id` or its `name`.
    pub fn answers_to(&self, model: &str) -> bool {
        self.id == model
            || string_field(&self.raw, "id") == Some(model)
            || string_field(&self.raw, "name") == Some(model)
    }
}

fn string_field<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// OpenAI-style list envelope served by `GET /v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<Model>,
}

impl ModelList {
    pub fn new(data: Vec<Model>) -> Self {
        Self { object: "list", data }
    }
}

/// Wire shape of a backend's `/v1/models` response.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<Value>,
}
