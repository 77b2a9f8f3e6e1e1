//! The shipping subgraph: estimates delivery for products owned by another subgraph.
//!
//! `Product.shippingEstimate` mentions the product name, which lives in the
//! product subgraph. The name is obtained through `@inject(fields: "name")`
//! in whichever mode the schema is built with. When it cannot be obtained the
//! estimate still resolves, referring to the product as "it".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;

use crate::error::ResolverError;
use crate::error::SchemaError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolver::Context;
use crate::resolver::FieldArguments;
use crate::resolver::ResolveInfo;
use crate::resolver::Resolver;
use crate::schema::FieldDefinition;
use crate::schema::ObjectType;
use crate::schema::SchemaBuilder;
use crate::schema::SubgraphSchema;

pub const PRODUCT_TYPE: &str = "Product";
pub const SHIPPING_ESTIMATE_FIELD: &str = "shippingEstimate";

/// Zip codes above this take twice as long.
const DISTANT_ZIPCODE: i64 = 20000;

static SHIPPING_BASE_DAYS: LazyLock<HashMap<&'static str, u64>> = LazyLock::new(|| {
    HashMap::from([
        ("sku-1", 3),
        ("sku-2", 5),
        ("sku-3", 1),
        ("sku-4", 7),
    ])
});

/// Resolves `Product.shippingEstimate(zipcode:)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShippingEstimateResolver;

impl ShippingEstimateResolver {
    async fn product_name(parent: &Object, args: &FieldArguments) -> Option<String> {
        if let Some(name) = parent.get("name").and_then(Value::as_str) {
            return Some(name.to_string());
        }
        let injection = args.injection()?;
        tracing::debug!(
            argument = injection.reserved_name(),
            "waiting for injected product name"
        );
        let result = injection.resolve().await;
        result.get("name").and_then(Value::as_str).map(str::to_string)
    }
}

#[async_trait]
impl Resolver for ShippingEstimateResolver {
    async fn resolve(
        &self,
        parent: &Object,
        args: FieldArguments,
        _context: &Context,
        _info: &ResolveInfo,
    ) -> Result<Value, ResolverError> {
        let sku = parent
            .get("sku")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolverError::new("product representation has no sku"))?;
        let base_days = SHIPPING_BASE_DAYS
            .get(sku)
            .copied()
            .ok_or_else(|| ResolverError::new(format!("no shipping data for sku '{sku}'")))?;

        let distant = args
            .get("zipcode")
            .and_then(Value::as_str)
            .and_then(|zipcode| zipcode.trim().parse::<i64>().ok())
            .is_some_and(|zipcode| zipcode > DISTANT_ZIPCODE);
        let days = if distant { base_days * 2 } else { base_days };

        let product = match Self::product_name(parent, &args).await {
            Some(name) => format!("'{name}'"),
            None => "it".to_string(),
        };

        let mut estimate = Object::new();
        estimate.insert("days", Value::from(days));
        estimate.insert("message", Value::from(format!("Get {product} in {days} day(s)")));
        Ok(Value::Object(estimate))
    }
}

/// Declare the shipping subgraph on `builder` and build it.
pub fn shipping_schema(builder: SchemaBuilder) -> Result<SubgraphSchema, SchemaError> {
    builder
        .object(
            ObjectType::new("ShippingEstimate")
                .field(FieldDefinition::new("message", "String!"))
                .field(FieldDefinition::new("days", "Int!")),
        )
        .object(
            ObjectType::extension(PRODUCT_TYPE)
                .key("sku")
                .field(FieldDefinition::new("sku", "String!").external())
                .reference("name", "String!")
                .field(
                    FieldDefinition::new(SHIPPING_ESTIMATE_FIELD, "ShippingEstimate")
                        .argument("zipcode", "String!")
                        .with_resolver(Arc::new(ShippingEstimateResolver))
                        .inject("name"),
                ),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::directive::InjectMode;

    fn product(sku: &str, name: Option<&str>) -> Object {
        let mut parent = Object::new();
        parent.insert("__typename", Value::from(PRODUCT_TYPE));
        parent.insert("sku", Value::from(sku));
        if let Some(name) = name {
            parent.insert("name", Value::from(name));
        }
        parent
    }

    fn zipcode(zipcode: &str) -> Object {
        let mut args = Object::new();
        args.insert("zipcode", Value::from(zipcode));
        args
    }

    async fn estimate(parent: Object, args: Object) -> Result<Value, ResolverError> {
        let schema = shipping_schema(SchemaBuilder::new(None)).unwrap();
        schema
            .resolve_field(
                PRODUCT_TYPE,
                SHIPPING_ESTIMATE_FIELD,
                &parent,
                args,
                &Context::default(),
            )
            .await
    }

    #[test(tokio::test)]
    async fn nearby_zipcode_uses_base_days() {
        let value = estimate(product("sku-1", Some("Widget")), zipcode("10001"))
            .await
            .unwrap();
        assert_eq!(
            value,
            json!({ "days": 3, "message": "Get 'Widget' in 3 day(s)" })
        );
    }

    #[test(tokio::test)]
    async fn distant_zipcode_doubles_days() {
        let value = estimate(product("sku-2", Some("Gadget")), zipcode("90210"))
            .await
            .unwrap();
        assert_eq!(
            value,
            json!({ "days": 10, "message": "Get 'Gadget' in 10 day(s)" })
        );
    }

    #[test(tokio::test)]
    async fn unparsable_zipcode_is_nearby() {
        let value = estimate(product("sku-3", None), zipcode("SW1A 1AA"))
            .await
            .unwrap();
        assert_eq!(value, json!({ "days": 1, "message": "Get it in 1 day(s)" }));
    }

    #[test(tokio::test)]
    async fn unknown_sku_fails() {
        let error = estimate(product("sku-404", None), zipcode("10001"))
            .await
            .unwrap_err();
        assert_eq!(error.message, "no shipping data for sku 'sku-404'");
    }

    #[test]
    fn background_schema_sdl() {
        let client = tower::util::BoxCloneService::new(tower::service_fn(
            |_: crate::subquery::Subquery| async {
                Ok::<_, tower::BoxError>(crate::client::SubqueryResult::Resolved(Object::new()))
            },
        ));
        let schema =
            shipping_schema(SchemaBuilder::new(Some(InjectMode::Background)).client(client))
                .unwrap();
        insta::assert_snapshot!(schema.to_string().trim_end(), @r#"
    enum InjectMode {
      DECLARATIVE
      BACKGROUND
      ON_DEMAND
    }

    directive @inject(fields: String!, mode: InjectMode!) on FIELD_DEFINITION

    type ShippingEstimate {
      message: String!
      days: Int!
    }

    extend type Product @key(fields: "sku") {
      sku: String! @external
      # representation: __typename sku
      shippingEstimate(zipcode: String!): ShippingEstimate @inject(fields: "name", mode: BACKGROUND)
    }
    "#);
    }

    #[test]
    fn declarative_schema_requires_name() {
        let schema = shipping_schema(SchemaBuilder::new(Some(InjectMode::Declarative))).unwrap();
        let sdl = schema.to_string();
        assert!(sdl.contains("extend type Product @key(fields: \"sku\") {"), "{sdl}");
        assert!(sdl.contains("  sku: String! @external\n"), "{sdl}");
        assert!(sdl.contains("  name: String! @external\n"), "{sdl}");
        let estimate = concat!(
            "  shippingEstimate(zipcode: String!): ShippingEstimate",
            r#" @requires(fields: "name")"#,
            "\n",
        );
        assert!(sdl.contains(estimate), "{sdl}");
        assert!(!sdl.contains("# representation"), "{sdl}");
    }
}
