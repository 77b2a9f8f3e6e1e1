//! Configuration for `@inject`.
//!
//! Can be created through `serde::Deserialize` from YAML, or inline in Rust
//! code through the builders.

use std::path::Path;
use std::time::Duration;

use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::client::ComposedQueryClient;
use crate::directive::InjectMode;
use crate::subquery::DEFAULT_ID_FIELD;
use crate::subquery::SubqueryBuilder;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:4000/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file '{path}': {error}
    CannotRead { path: String, error: String },
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// unknown inject mode '{0}', expected one of DECLARATIVE, BACKGROUND, ON_DEMAND
    UnknownInjectMode(String),
    /// could not create the composed-query client: {0}
    ClientCreation(String),
}

/// The configuration of a subgraph using `@inject`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Injection options.
    #[serde(default)]
    pub inject: InjectConfiguration,
}

/// Options for resolving `@inject` annotations.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct InjectConfiguration {
    /// How annotated fields are satisfied.
    /// When unset, annotations are left out of the schema entirely.
    pub mode: Option<InjectMode>,

    /// The composed-graph entry point sub-queries are sent to.
    pub endpoint: Url,

    /// Give up on a sub-query after this long. Defaults to 30s.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,

    /// The field identifying entities fetched through `node(id:)`.
    pub id_field: String,
}

#[buildstructor::buildstructor]
impl InjectConfiguration {
    #[builder]
    pub fn new(
        mode: Option<InjectMode>,
        endpoint: Option<Url>,
        timeout: Option<Duration>,
        id_field: Option<String>,
    ) -> Self {
        Self {
            mode,
            endpoint: endpoint.unwrap_or_else(default_endpoint),
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            id_field: id_field.unwrap_or_else(|| DEFAULT_ID_FIELD.to_string()),
        }
    }
}

impl Default for InjectConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl InjectConfiguration {
    /// A client for the configured entry point.
    pub fn client(&self) -> Result<ComposedQueryClient, ConfigurationError> {
        ComposedQueryClient::new(self.endpoint.clone(), self.timeout)
            .map_err(|error| ConfigurationError::ClientCreation(error.to_string()))
    }

    pub fn subquery_builder(&self) -> SubqueryBuilder {
        SubqueryBuilder::new(self.id_field.clone())
    }
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint must be a valid URL")
}

impl Configuration {
    /// Parse and validate a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let configuration: Configuration = serde_yaml::from_str(raw_yaml).map_err(|e| {
            ConfigurationError::InvalidConfiguration {
                message: "failed to parse yaml",
                error: e.to_string(),
            }
        })?;
        configuration.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let raw_yaml =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::CannotRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Self::from_yaml_str(&raw_yaml)
    }

    fn validate(self) -> Result<Self, ConfigurationError> {
        let id_field = &self.inject.id_field;
        let valid_name = id_field
            .chars()
            .next()
            .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
            && id_field.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
        if !valid_name {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "id_field must be a GraphQL field name",
                error: format!("got '{id_field}'"),
            });
        }
        if self.inject.timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "timeout must be greater than zero",
                error: format!("got {:?}", self.inject.timeout),
            });
        }
        Ok(self)
    }
}

/// The JSON schema of the configuration file.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;

    #[test]
    fn empty_configuration_uses_defaults() {
        let configuration = Configuration::from_yaml_str("").unwrap();
        assert_eq!(configuration.inject.mode, None);
        assert_eq!(configuration.inject.endpoint.as_str(), "http://127.0.0.1:4000/");
        assert_eq!(configuration.inject.timeout, Duration::from_secs(30));
        assert_eq!(configuration.inject.id_field, "id");
    }

    #[test]
    fn parses_yaml() {
        let configuration = Configuration::from_yaml_str(
            r#"
inject:
  mode: INVOKE
  endpoint: http://gateway:4000/graphql
  timeout: 2s
  id_field: nodeId
"#,
        )
        .unwrap();
        assert_eq!(
            configuration.inject,
            InjectConfiguration::builder()
                .mode(InjectMode::OnDemand)
                .endpoint(Url::parse("http://gateway:4000/graphql").unwrap())
                .timeout(Duration::from_secs(2))
                .id_field("nodeId".to_string())
                .build()
        );
        assert_eq!(configuration.inject.subquery_builder().id_field(), "nodeId");
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = Configuration::from_yaml_str("inject:\n  retries: 3\n").unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidConfiguration { .. }));
    }

    #[test]
    fn rejects_unknown_mode() {
        let error = Configuration::from_yaml_str("inject:\n  mode: EAGER\n").unwrap_err();
        assert!(error.to_string().starts_with("failed to parse yaml"));
    }

    #[test]
    fn rejects_invalid_id_field() {
        let error = Configuration::from_yaml_str("inject:\n  id_field: \"node id\"\n").unwrap_err();
        assert_eq!(
            error.to_string(),
            "id_field must be a GraphQL field name: got 'node id'"
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let error = Configuration::from_yaml_str("inject:\n  timeout: 0s\n").unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidConfiguration { .. }));
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "inject:\n  mode: BACKGROUND").unwrap();
        let configuration = Configuration::from_file(file.path()).unwrap();
        assert_eq!(configuration.inject.mode, Some(InjectMode::Background));

        let error = Configuration::from_file(Path::new("/nonexistent/inject.yaml")).unwrap_err();
        assert!(matches!(error, ConfigurationError::CannotRead { .. }));
    }

    #[test]
    fn schema_lists_options() {
        let schema = serde_json::to_value(generate_config_schema()).unwrap();
        let schema = schema.to_string();
        for option in ["inject", "mode", "endpoint", "timeout", "id_field", "ON_DEMAND"] {
            assert!(schema.contains(option), "schema is missing {option}");
        }
    }

    #[test]
    fn builds_client() {
        let client = InjectConfiguration::default().client().unwrap();
        assert_eq!(client.endpoint().as_str(), "http://127.0.0.1:4000/");
    }
}
