//! Builds the synthetic query that re-fetches fields of one entity through the composed graph.

use std::fmt;

use apollo_compiler::ast;

use crate::entity_key::EntityKey;
use crate::error::FetchError;
use crate::error::SchemaError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Name of the operation sent to the composed graph.
pub const SUBQUERY_OPERATION_NAME: &str = "InvokeDirective";
/// Name of the single variable carrying the encoded entity key.
pub const ENTITY_KEY_VARIABLE: &str = "id";
/// Root field used to look entities up by identifier.
pub const NODE_FIELD: &str = "node";
/// Field selected on every entity so callers can confirm its identity.
pub const DEFAULT_ID_FIELD: &str = "id";

/// A validated sub-selection, as written in the `fields` argument of `@inject`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSelection {
    source: String,
    response_keys: Vec<String>,
}

impl FieldSelection {
    /// Parse a selection such as `"name"` or `"name brand { name }"`.
    pub fn parse(selection: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidSelection {
            selection: selection.to_string(),
            reason,
        };

        let source = selection.trim();
        if source.is_empty() {
            return Err(invalid("selection is empty".to_string()));
        }

        let document = ast::Document::parse(format!("{{ {source} }}"), "inject.graphql")
            .map_err(|invalid_document| invalid(invalid_document.errors.to_string()))?;

        let [ast::Definition::OperationDefinition(operation)] = document.definitions.as_slice()
        else {
            return Err(invalid(
                "selection must be a single set of fields".to_string(),
            ));
        };

        let mut response_keys = Vec::new();
        collect_response_keys(&operation.selection_set, &mut response_keys).map_err(invalid)?;

        Ok(Self {
            source: source.to_string(),
            response_keys,
        })
    }

    /// The selection as written, trimmed.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The top-level response keys selected, in order.
    pub fn response_keys(&self) -> impl Iterator<Item = &str> {
        self.response_keys.iter().map(String::as_str)
    }

    pub fn contains(&self, response_key: &str) -> bool {
        self.response_keys.iter().any(|key| key == response_key)
    }
}

impl fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_response_keys(
    selection_set: &[ast::Selection],
    keys: &mut Vec<String>,
) -> Result<(), String> {
    for selection in selection_set {
        match selection {
            ast::Selection::Field(field) => {
                if contains_fragment_spread(&field.selection_set) {
                    return Err("fragment spreads are not supported".to_string());
                }
                let key = field.alias.as_ref().unwrap_or(&field.name).to_string();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            ast::Selection::InlineFragment(fragment) => {
                collect_response_keys(&fragment.selection_set, keys)?;
            }
            ast::Selection::FragmentSpread(_) => {
                return Err("fragment spreads are not supported".to_string());
            }
        }
    }
    Ok(())
}

fn contains_fragment_spread(selection_set: &[ast::Selection]) -> bool {
    selection_set.iter().any(|selection| match selection {
        ast::Selection::Field(field) => contains_fragment_spread(&field.selection_set),
        ast::Selection::InlineFragment(fragment) => {
            contains_fragment_spread(&fragment.selection_set)
        }
        ast::Selection::FragmentSpread(_) => true,
    })
}

/// Builds sub-queries that look one entity up through `node(id:)`.
#[derive(Clone, Debug)]
pub struct SubqueryBuilder {
    id_field: String,
}

impl Default for SubqueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FIELD)
    }
}

impl SubqueryBuilder {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Build the query re-resolving `selection` on the `parent_type_name`
    /// entity identified by `key`.
    ///
    /// The identifying field is always selected, whether or not `selection` names it.
    pub fn build(
        &self,
        parent_type_name: &str,
        key: &EntityKey,
        selection: &FieldSelection,
    ) -> Subquery {
        let id_field = if selection.contains(&self.id_field) {
            String::new()
        } else {
            format!("\n      {}", self.id_field)
        };
        let query = format!(
            "query {SUBQUERY_OPERATION_NAME}(${ENTITY_KEY_VARIABLE}: ID!) {{
  {NODE_FIELD}(id: ${ENTITY_KEY_VARIABLE}) {{
    ... on {parent_type_name} {{{id_field}
      {selection}
    }}
  }}
}}"
        );

        let mut variables = Object::new();
        variables.insert(ENTITY_KEY_VARIABLE, Value::from(key.encode()));

        Subquery {
            key: key.clone(),
            id_field: self.id_field.clone(),
            request: graphql::Request::builder()
                .query(query)
                .operation_name(SUBQUERY_OPERATION_NAME)
                .variables(variables)
                .build(),
        }
    }
}

/// A sub-query ready to be sent to the composed graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subquery {
    /// The entity being re-fetched.
    pub key: EntityKey,
    /// The field identifying the entity in the response.
    pub id_field: String,
    /// The request posted to the composed-graph entry point.
    pub request: graphql::Request,
}

impl Subquery {
    /// Extract the entity payload at `data.node`, checking it is the entity that was asked for.
    pub(crate) fn extract_entity(&self, response: graphql::Response) -> Result<Object, FetchError> {
        let expected_id = self.key.encode();
        let graphql::Response { data, errors, .. } = response;
        let node = data
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|data| data.get(NODE_FIELD));

        match node {
            Some(Value::Object(entity)) => match entity.get(self.id_field.as_str()) {
                Some(id) if id.as_str() == Some(expected_id.as_str()) => Ok(entity.clone()),
                Some(id) => Err(FetchError::SubrequestMalformedResponse {
                    reason: format!("expected entity '{expected_id}' but received {id:?}"),
                }),
                // the type condition did not match the entity behind this identifier
                None if entity.is_empty() => Err(FetchError::EntityNotFound { id: expected_id }),
                None => Ok(entity.clone()),
            },
            Some(Value::Null) | None if !errors.is_empty() => {
                Err(FetchError::SubrequestGraphqlErrors {
                    message: errors
                        .iter()
                        .map(|error| error.message.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
            Some(Value::Null) => Err(FetchError::EntityNotFound { id: expected_id }),
            None => Err(FetchError::SubrequestMalformedResponse {
                reason: format!("response has no data at '{NODE_FIELD}'"),
            }),
            Some(_) => Err(FetchError::SubrequestMalformedResponse {
                reason: format!("'{NODE_FIELD}' is not an object"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json as bjson;
    use test_log::test;

    use super::*;

    fn product_key() -> EntityKey {
        EntityKey::new("Product", "sku-1")
    }

    #[test]
    fn parses_simple_selection() {
        let selection = FieldSelection::parse(" name ").unwrap();
        assert_eq!(selection.as_str(), "name");
        assert_eq!(selection.response_keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn parses_nested_and_aliased_selection() {
        let selection =
            FieldSelection::parse("title: name brand { name } ... on Product { sku }").unwrap();
        assert_eq!(
            selection.response_keys().collect::<Vec<_>>(),
            vec!["title", "brand", "sku"]
        );
        assert!(selection.contains("brand"));
        assert!(!selection.contains("name"));
    }

    #[test]
    fn rejects_invalid_selections() {
        for selection in [
            "",
            "   ",
            "name {",
            "...Details",
            "brand { ...Details }",
            "name } query X { id",
        ] {
            assert!(
                matches!(
                    FieldSelection::parse(selection),
                    Err(SchemaError::InvalidSelection { .. })
                ),
                "{selection:?} should be rejected"
            );
        }
    }

    #[test]
    fn builds_node_lookup() {
        let selection = FieldSelection::parse("name").unwrap();
        let subquery = SubqueryBuilder::default().build("Product", &product_key(), &selection);

        assert_eq!(
            subquery.request.query.as_deref(),
            Some(
                "query InvokeDirective($id: ID!) {
  node(id: $id) {
    ... on Product {
      id
      name
    }
  }
}"
            )
        );
        assert_eq!(
            subquery.request.operation_name.as_deref(),
            Some(SUBQUERY_OPERATION_NAME)
        );
        assert_eq!(
            subquery.request.variables.get("id"),
            Some(&Value::from("UHJvZHVjdDpza3UtMQ=="))
        );
    }

    #[test]
    fn does_not_select_identifying_field_twice() {
        let selection = FieldSelection::parse("id name").unwrap();
        let subquery = SubqueryBuilder::default().build("Product", &product_key(), &selection);
        let query = subquery.request.query.unwrap();
        assert_eq!(query.matches("id\n").count(), 0);
        assert!(query.contains("      id name\n"));
    }

    #[test]
    fn uses_configured_identifying_field() {
        let selection = FieldSelection::parse("name").unwrap();
        let subquery = SubqueryBuilder::new("nodeId").build("Product", &product_key(), &selection);
        assert!(subquery.request.query.unwrap().contains("      nodeId\n      name"));
        assert_eq!(subquery.id_field, "nodeId");
    }

    #[test]
    fn built_query_is_valid_graphql() {
        let selection = FieldSelection::parse("name brand { name }").unwrap();
        let subquery = SubqueryBuilder::default().build("Product", &product_key(), &selection);
        ast::Document::parse(subquery.request.query.unwrap(), "subquery.graphql").unwrap();
    }

    fn subquery() -> Subquery {
        SubqueryBuilder::default().build(
            "Product",
            &product_key(),
            &FieldSelection::parse("name").unwrap(),
        )
    }

    fn response(value: Value) -> graphql::Response {
        serde_json_bytes::from_value(value).unwrap()
    }

    #[test]
    fn extracts_entity() {
        let entity = subquery()
            .extract_entity(response(bjson!({
                "data": {"node": {"id": "UHJvZHVjdDpza3UtMQ==", "name": "Widget"}}
            })))
            .unwrap();
        assert_eq!(entity.get("name"), Some(&Value::from("Widget")));
    }

    #[test]
    fn extracts_entity_without_identifying_field() {
        let entity = subquery()
            .extract_entity(response(bjson!({"data": {"node": {"name": "Widget"}}})))
            .unwrap();
        assert_eq!(entity, bjson!({"name": "Widget"}).as_object().cloned().unwrap());
    }

    #[test]
    fn missing_path_is_a_failure() {
        assert!(matches!(
            subquery().extract_entity(response(bjson!({"data": {}}))),
            Err(FetchError::SubrequestMalformedResponse { .. })
        ));
        assert!(matches!(
            subquery().extract_entity(response(bjson!({"data": {"node": "nope"}}))),
            Err(FetchError::SubrequestMalformedResponse { .. })
        ));
    }

    #[test]
    fn null_node_is_not_found() {
        assert_eq!(
            subquery().extract_entity(response(bjson!({"data": {"node": null}}))),
            Err(FetchError::EntityNotFound {
                id: "UHJvZHVjdDpza3UtMQ==".to_string()
            })
        );
    }

    #[test]
    fn empty_node_is_not_found() {
        assert!(matches!(
            subquery().extract_entity(response(bjson!({"data": {"node": {}}}))),
            Err(FetchError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn identity_mismatch_is_a_failure() {
        assert!(matches!(
            subquery().extract_entity(response(bjson!({
                "data": {"node": {"id": "QnJhbmQ6MQ==", "name": "Other"}}
            }))),
            Err(FetchError::SubrequestMalformedResponse { .. })
        ));
    }

    #[test]
    fn graphql_errors_are_reported() {
        assert_eq!(
            subquery().extract_entity(response(bjson!({
                "data": {"node": null},
                "errors": [{"message": "product service down"}, {"message": "try later"}]
            }))),
            Err(FetchError::SubrequestGraphqlErrors {
                message: "product service down, try later".to_string()
            })
        );
    }
}
