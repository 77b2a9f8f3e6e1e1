//! JSON aliases shared by the wire types and the resolvers.

pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = serde_json_bytes::Map<ByteString, Value>;

/// Extension methods for reading entity representations.
pub trait ValueExt {
    /// Render a scalar as the string used to identify an entity.
    ///
    /// Strings are used as-is, numbers and booleans use their JSON rendering.
    /// Returns `None` for null, lists and objects, which cannot identify an entity.
    fn as_key_string(&self) -> Option<String>;
}

impl ValueExt for Value {
    fn as_key_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.as_str().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}
