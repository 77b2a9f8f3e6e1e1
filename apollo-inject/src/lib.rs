//! Field-level data injection for federated GraphQL subgraphs.
//!
//! A field annotated with `@inject(fields:, mode:)` needs sibling fields of its
//! parent entity that another subgraph owns. Depending on the mode, the
//! annotation is either handed to the query planner as a `@requires`
//! requirement, or satisfied at runtime by a sub-query against the composed
//! graph whose result is passed to the field resolver.

pub mod client;
pub mod configuration;
pub mod demos;
pub mod directive;
pub mod entity_key;
pub mod error;
mod executable;
pub mod graphql;
pub mod json_ext;
pub mod requirements;
pub mod resolver;
pub mod schema;
pub mod subquery;

pub use crate::client::BoxService;
pub use crate::client::ComposedQueryClient;
pub use crate::client::SubqueryResult;
pub use crate::configuration::Configuration;
pub use crate::configuration::InjectConfiguration;
pub use crate::directive::InjectMode;
pub use crate::directive::InjectionSpec;
pub use crate::entity_key::EntityKey;
pub use crate::error::ConfigurationError;
pub use crate::error::FetchError;
pub use crate::error::MalformedKey;
pub use crate::error::ResolverError;
pub use crate::error::SchemaError;
pub use crate::executable::main;
pub use crate::resolver::Context;
pub use crate::resolver::FieldArguments;
pub use crate::resolver::InjectHandle;
pub use crate::resolver::InjectInvoker;
pub use crate::resolver::PendingInjection;
pub use crate::resolver::ResolveInfo;
pub use crate::resolver::Resolver;
pub use crate::schema::FieldDefinition;
pub use crate::schema::ObjectType;
pub use crate::schema::SchemaBuilder;
pub use crate::schema::SubgraphSchema;
pub use crate::subquery::FieldSelection;
pub use crate::subquery::Subquery;
pub use crate::subquery::SubqueryBuilder;
