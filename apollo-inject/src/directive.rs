//! The `@inject` directive and the build-time choice of how to honour it.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::ConfigurationError;
use crate::error::SchemaError;
use crate::requirements;
use crate::requirements::RequirementMetadata;
use crate::subquery::FieldSelection;

pub const INJECT_DIRECTIVE_NAME: &str = "inject";

/// SDL for the directive and its mode enum, as exposed by subgraphs using it.
pub const INJECT_DIRECTIVE_DEFINITIONS: &str = r#"enum InjectMode {
  DECLARATIVE
  BACKGROUND
  ON_DEMAND
}

directive @inject(fields: String!, mode: InjectMode!) on FIELD_DEFINITION"#;

/// How an `@inject` annotation is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjectMode {
    /// The query planner fetches the sibling fields through `@requires`.
    /// No sub-query is issued at runtime.
    #[serde(alias = "SYNC")]
    Declarative,

    /// The sub-query starts as soon as the field is invoked and the field
    /// logic receives a handle on its eventual result.
    #[serde(alias = "ASYNC")]
    Background,

    /// The field logic receives a callable that issues the sub-query the first
    /// time it is invoked.
    #[serde(alias = "INVOKE")]
    OnDemand,
}

impl InjectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectMode::Declarative => "DECLARATIVE",
            InjectMode::Background => "BACKGROUND",
            InjectMode::OnDemand => "ON_DEMAND",
        }
    }
}

impl fmt::Display for InjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InjectMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DECLARATIVE" | "SYNC" => Ok(InjectMode::Declarative),
            "BACKGROUND" | "ASYNC" => Ok(InjectMode::Background),
            "ON_DEMAND" | "INVOKE" => Ok(InjectMode::OnDemand),
            _ => Err(ConfigurationError::UnknownInjectMode(s.to_string())),
        }
    }
}

/// The arguments of one `@inject` annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectionSpec {
    fields: FieldSelection,
    mode: InjectMode,
}

impl InjectionSpec {
    pub fn new(fields: &str, mode: InjectMode) -> Result<Self, SchemaError> {
        Ok(Self {
            fields: FieldSelection::parse(fields)?,
            mode,
        })
    }

    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    pub fn mode(&self) -> InjectMode {
        self.mode
    }
}

impl fmt::Display for InjectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{INJECT_DIRECTIVE_NAME}(fields: {}, mode: {})",
            requirements::graphql_string(self.fields.as_str()),
            self.mode
        )
    }
}

/// The runtime behaviour installed by a wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Background,
    OnDemand,
}

/// What to install on an annotated field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Installation {
    /// Keep the resolver untouched and hand this requirement to the planner.
    Requirement(RequirementMetadata),
    /// Wrap the resolver so it receives injected data at runtime.
    Wrapper(WrapMode),
}

/// Decide how `spec` is honoured. Evaluated once per annotated field, at schema build time.
pub fn select_installation(spec: &InjectionSpec) -> Installation {
    match spec.mode() {
        InjectMode::Declarative => Installation::Requirement(requirements::emit(spec)),
        InjectMode::Background => Installation::Wrapper(WrapMode::Background),
        InjectMode::OnDemand => Installation::Wrapper(WrapMode::OnDemand),
    }
}
