//! Transport-safe identifiers for entity instances.
//!
//! The composed graph looks entities up through `node(id: ID!)`, with
//! identifiers in the relay global identifier format:
//! `base64("<TypeName>:<primary value>")`.

use std::fmt;

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;

use crate::error::MalformedKey;

const SEPARATOR: char = ':';

/// Identifies one instance of an entity: its type and primary key value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    type_name: String,
    primary_value: String,
}

impl EntityKey {
    pub fn new(type_name: impl Into<String>, primary_value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            primary_value: primary_value.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn primary_value(&self) -> &str {
        &self.primary_value
    }

    /// Encode this key as an opaque identifier.
    pub fn encode(&self) -> String {
        BASE64_STANDARD.encode(format!(
            "{}{SEPARATOR}{}",
            self.type_name, self.primary_value
        ))
    }

    /// Decode an identifier produced by [`EntityKey::encode`].
    ///
    /// The primary value may itself contain the separator, only the first one
    /// delimits the type name.
    pub fn decode(encoded: &str) -> Result<Self, MalformedKey> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|error| MalformedKey::InvalidEncoding(error.to_string()))?;
        let decoded = String::from_utf8(bytes).map_err(|_| MalformedKey::InvalidUtf8)?;
        let (type_name, primary_value) = decoded
            .split_once(SEPARATOR)
            .ok_or(MalformedKey::MissingSeparator)?;

        if !is_valid_type_name(type_name) {
            return Err(MalformedKey::UnsupportedType(type_name.to_string()));
        }
        if primary_value.is_empty() {
            return Err(MalformedKey::EmptyPrimaryValue(type_name.to_string()));
        }

        Ok(Self::new(type_name, primary_value))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.primary_value)
    }
}

/// https://spec.graphql.org/October2021/#Name
fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn encodes_relay_global_id() {
        let key = EntityKey::new("Product", "sku-1");
        assert_eq!(key.encode(), "UHJvZHVjdDpza3UtMQ==");
    }

    #[test]
    fn decode_inverts_encode() {
        for (type_name, value) in [
            ("Product", "sku-1"),
            ("Brand", "42"),
            ("_Internal", "with:colons:inside"),
            ("Review", "üñíçødé"),
        ] {
            let key = EntityKey::new(type_name, value);
            let decoded = EntityKey::decode(&key.encode()).unwrap();
            assert_eq!(decoded.type_name(), type_name);
            assert_eq!(decoded.primary_value(), value);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            EntityKey::decode("not base64!"),
            Err(MalformedKey::InvalidEncoding(_))
        ));
    }

    #[test]
    fn decode_rejects_missing_separator() {
        let encoded = BASE64_STANDARD.encode("Product");
        assert_eq!(
            EntityKey::decode(&encoded),
            Err(MalformedKey::MissingSeparator)
        );
    }

    #[test]
    fn decode_rejects_unsupported_type_tag() {
        let encoded = BASE64_STANDARD.encode("1Product:sku-1");
        assert_eq!(
            EntityKey::decode(&encoded),
            Err(MalformedKey::UnsupportedType("1Product".to_string()))
        );

        let encoded = BASE64_STANDARD.encode(":sku-1");
        assert_eq!(
            EntityKey::decode(&encoded),
            Err(MalformedKey::UnsupportedType(String::new()))
        );
    }

    #[test]
    fn decode_rejects_empty_value() {
        let encoded = BASE64_STANDARD.encode("Product:");
        assert_eq!(
            EntityKey::decode(&encoded),
            Err(MalformedKey::EmptyPrimaryValue("Product".to_string()))
        );
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let encoded = BASE64_STANDARD.encode([0xff, 0xfe, b':', b'a']);
        assert_eq!(EntityKey::decode(&encoded), Err(MalformedKey::InvalidUtf8));
    }
}
