//! Planner metadata for annotations satisfied without any runtime sub-query.

use std::fmt;

use crate::directive::InjectionSpec;
use crate::subquery::FieldSelection;

pub const REQUIRES_DIRECTIVE_NAME: &str = "requires";
pub const EXTERNAL_DIRECTIVE_NAME: &str = "external";

/// Marks a field as needing sibling fields of the same entity before it resolves.
///
/// Rendered as `@requires(fields: "...")` on the field, with each sibling
/// declared `@external` on the entity, so the planner fetches them from
/// their owning service and passes them in the entity representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequirementMetadata {
    fields: FieldSelection,
}

impl RequirementMetadata {
    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    /// Sibling fields that must be declared `@external` on the entity.
    pub fn external_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.response_keys()
    }
}

impl fmt::Display for RequirementMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{REQUIRES_DIRECTIVE_NAME}(fields: {})",
            graphql_string(self.fields.as_str())
        )
    }
}

/// Translate an annotation into the planner requirement it stands for.
pub fn emit(spec: &InjectionSpec) -> RequirementMetadata {
    RequirementMetadata {
        fields: spec.fields().clone(),
    }
}

/// Quote `value` as a GraphQL string literal.
pub(crate) fn graphql_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
