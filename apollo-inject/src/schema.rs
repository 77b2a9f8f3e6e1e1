//! Subgraph schemas with `@inject` annotations installed.
//!
//! Annotations are declared on [`FieldDefinition`]s and resolved once, in
//! [`SchemaBuilder::build`]: declarative annotations become planner
//! requirements, the others replace the field resolver with an
//! [`InjectResolver`]. Nothing about the choice is revisited per request.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::client::BoxService;
use crate::configuration::ConfigurationError;
use crate::configuration::InjectConfiguration;
use crate::directive::INJECT_DIRECTIVE_DEFINITIONS;
use crate::directive::InjectMode;
use crate::directive::InjectionSpec;
use crate::directive::Installation;
use crate::directive::select_installation;
use crate::error::ResolverError;
use crate::error::SchemaError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::requirements::EXTERNAL_DIRECTIVE_NAME;
use crate::requirements::RequirementMetadata;
use crate::requirements::graphql_string;
use crate::resolver::BoxResolver;
use crate::resolver::Context;
use crate::resolver::FieldArguments;
use crate::resolver::InjectResolver;
use crate::resolver::ParentFieldResolver;
use crate::resolver::ResolveInfo;
use crate::resolver::TYPENAME;
use crate::subquery::FieldSelection;
use crate::subquery::SubqueryBuilder;

/// A field as declared in the subgraph.
#[derive(Clone)]
pub struct FieldDefinition {
    name: String,
    ty: String,
    arguments: Vec<(String, String)>,
    external: bool,
    reference: bool,
    resolver: BoxResolver,
    annotation: Option<Annotation>,
    installed: Option<Installed>,
}

#[derive(Clone, Debug)]
struct Annotation {
    fields: String,
    mode: Option<InjectMode>,
}

#[derive(Clone, Debug)]
struct Installed {
    spec: InjectionSpec,
    requirement: Option<RequirementMetadata>,
    representation: Vec<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            arguments: Vec::new(),
            external: false,
            reference: false,
            resolver: Arc::new(ParentFieldResolver),
            annotation: None,
            installed: None,
        }
    }

    pub fn argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.arguments.push((name.into(), ty.into()));
        self
    }

    /// Owned by another subgraph, typically a key field of an extended entity.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn with_resolver(mut self, resolver: BoxResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Annotate with `@inject(fields:)`, in the mode the schema is built with.
    pub fn inject(mut self, fields: impl Into<String>) -> Self {
        self.annotation = Some(Annotation {
            fields: fields.into(),
            mode: None,
        });
        self
    }

    /// Annotate with `@inject(fields:, mode:)`, overriding the schema's mode.
    pub fn inject_with_mode(mut self, fields: impl Into<String>, mode: InjectMode) -> Self {
        self.annotation = Some(Annotation {
            fields: fields.into(),
            mode: Some(mode),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &BoxResolver {
        &self.resolver
    }

    /// The installed annotation, if the field carries one in the built schema.
    pub fn injection(&self) -> Option<&InjectionSpec> {
        self.installed.as_ref().map(|installed| &installed.spec)
    }

    /// The planner requirement, for declarative annotations.
    pub fn requirement(&self) -> Option<&RequirementMetadata> {
        self.installed
            .as_ref()
            .and_then(|installed| installed.requirement.as_ref())
    }

    /// Whether the resolver was replaced by an injection wrapper.
    pub fn is_wrapped(&self) -> bool {
        self.installed
            .as_ref()
            .is_some_and(|installed| installed.requirement.is_none())
    }

    /// Fields the planner must include in the parent representation for the
    /// wrapper to identify the entity.
    pub fn representation_requirements(&self) -> impl Iterator<Item = &str> {
        self.installed
            .iter()
            .flat_map(|installed| installed.representation.iter().map(String::as_str))
    }

    fn write_sdl(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // fields the wrapper reads from the parent representation
        if self.is_wrapped() {
            let representation = self
                .representation_requirements()
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "  # representation: {representation}")?;
        }
        write!(f, "  {}", self.name)?;
        if !self.arguments.is_empty() {
            let arguments = self
                .arguments
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "({arguments})")?;
        }
        write!(f, ": {}", self.ty)?;
        if self.external || self.reference {
            write!(f, " @{EXTERNAL_DIRECTIVE_NAME}")?;
        }
        match &self.installed {
            Some(Installed {
                requirement: Some(requirement),
                ..
            }) => write!(f, " {requirement}")?,
            Some(Installed { spec, .. }) => write!(f, " {spec}")?,
            None => {}
        }
        writeln!(f)
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .field("external", &self.external)
            .field("reference", &self.reference)
            .field("annotation", &self.annotation)
            .field("installed", &self.installed)
            .finish()
    }
}

/// An object type, or an extension of an entity owned elsewhere.
#[derive(Clone, Debug)]
pub struct ObjectType {
    name: String,
    extension: bool,
    key: Option<String>,
    fields: Vec<FieldDefinition>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: false,
            key: None,
            fields: Vec::new(),
        }
    }

    /// `extend type <name>`
    pub fn extension(name: impl Into<String>) -> Self {
        Self {
            extension: true,
            ..Self::new(name)
        }
    }

    /// `@key(fields:)`
    pub fn key(mut self, fields: impl Into<String>) -> Self {
        self.key = Some(fields.into());
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// A sibling owned by another subgraph that an annotation may depend on.
    ///
    /// It only appears in the schema, as `@external`, when a declarative
    /// requirement names it.
    pub fn reference(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        let mut field = FieldDefinition::new(name, ty);
        field.reference = true;
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_definition(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn key_fields(&self) -> Result<Vec<String>, SchemaError> {
        match &self.key {
            Some(key) => Ok(FieldSelection::parse(key)?
                .response_keys()
                .map(str::to_string)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn is_rendered(field: &FieldDefinition, required: &[String]) -> bool {
        !field.reference || required.iter().any(|name| *name == field.name)
    }

    fn write_sdl(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extension {
            write!(f, "extend ")?;
        }
        write!(f, "type {}", self.name)?;
        if let Some(key) = &self.key {
            write!(f, " @key(fields: {})", graphql_string(key))?;
        }
        writeln!(f, " {{")?;
        let required: Vec<String> = self
            .fields
            .iter()
            .filter_map(FieldDefinition::requirement)
            .flat_map(|requirement| requirement.external_fields().map(str::to_string))
            .collect();
        for field in &self.fields {
            if Self::is_rendered(field, &required) {
                field.write_sdl(f)?;
            }
        }
        write!(f, "}}")
    }
}

/// Builds a [`SubgraphSchema`], installing every `@inject` annotation.
pub struct SchemaBuilder {
    mode: Option<InjectMode>,
    client: Option<BoxService>,
    subquery_builder: SubqueryBuilder,
    types: Vec<ObjectType>,
}

impl SchemaBuilder {
    /// Annotations without an explicit mode use `mode`. When it is `None` they
    /// are left out of the schema.
    pub fn new(mode: Option<InjectMode>) -> Self {
        Self {
            mode,
            client: None,
            subquery_builder: SubqueryBuilder::default(),
            types: Vec::new(),
        }
    }

    /// A builder sending sub-queries to the configured composed graph.
    pub fn from_configuration(
        configuration: &InjectConfiguration,
    ) -> Result<Self, ConfigurationError> {
        let client = configuration.client()?;
        Ok(Self::new(configuration.mode)
            .client(client.boxed())
            .subquery_builder(configuration.subquery_builder()))
    }

    /// The service answering sub-queries. Required when any annotation is
    /// installed in background or on-demand mode.
    pub fn client(mut self, client: BoxService) -> Self {
        self.client = Some(client);
        self
    }

    pub fn subquery_builder(mut self, subquery_builder: SubqueryBuilder) -> Self {
        self.subquery_builder = subquery_builder;
        self
    }

    pub fn object(mut self, object: ObjectType) -> Self {
        self.types.push(object);
        self
    }

    pub fn build(self) -> Result<SubgraphSchema, SchemaError> {
        let mut types = IndexMap::new();
        for mut object in self.types {
            if types.contains_key(&object.name) {
                return Err(SchemaError::DuplicateType(object.name));
            }
            for (index, field) in object.fields.iter().enumerate() {
                if object.fields[..index].iter().any(|f| f.name == field.name) {
                    return Err(SchemaError::DuplicateField {
                        type_name: object.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }

            let key_fields = object.key_fields()?;
            let sibling_names: Vec<String> =
                object.fields.iter().map(|field| field.name.clone()).collect();
            for field in &mut object.fields {
                install(
                    &object.name,
                    &key_fields,
                    &sibling_names,
                    field,
                    self.mode,
                    self.client.as_ref(),
                    &self.subquery_builder,
                )?;
            }
            types.insert(object.name.clone(), (object, key_fields));
        }

        Ok(SubgraphSchema {
            mode: self.mode,
            types,
        })
    }
}

/// Install the annotation carried by `field`, if any.
fn install(
    type_name: &str,
    key_fields: &[String],
    sibling_names: &[String],
    field: &mut FieldDefinition,
    default_mode: Option<InjectMode>,
    client: Option<&BoxService>,
    subquery_builder: &SubqueryBuilder,
) -> Result<(), SchemaError> {
    let Some(annotation) = &field.annotation else {
        return Ok(());
    };
    let Some(mode) = annotation.mode.or(default_mode) else {
        tracing::debug!(
            "no inject mode set, leaving {type_name}.{} unannotated",
            field.name
        );
        return Ok(());
    };
    let spec = InjectionSpec::new(&annotation.fields, mode)?;
    if key_fields.is_empty() {
        return Err(SchemaError::MissingKey {
            type_name: type_name.to_string(),
            field: field.name.clone(),
        });
    }

    tracing::info!(
        "setting up inject directive on {type_name}.{}, mode {mode}",
        field.name
    );
    let installed = match select_installation(&spec) {
        Installation::Requirement(requirement) => {
            if let Some(sibling) = requirement
                .external_fields()
                .find(|sibling| !sibling_names.iter().any(|name| name == sibling))
            {
                return Err(SchemaError::UnknownSibling {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    sibling: sibling.to_string(),
                });
            }
            Installed {
                spec,
                requirement: Some(requirement),
                representation: Vec::new(),
            }
        }
        Installation::Wrapper(wrap_mode) => {
            let client = client.cloned().ok_or_else(|| SchemaError::MissingClient {
                type_name: type_name.to_string(),
                field: field.name.clone(),
                mode,
            })?;
            field.resolver = Arc::new(InjectResolver::new(
                field.resolver.clone(),
                spec.clone(),
                wrap_mode,
                subquery_builder.clone(),
                client,
            ));
            let representation = std::iter::once(TYPENAME.to_string())
                .chain(key_fields.iter().cloned())
                .collect();
            Installed {
                spec,
                requirement: None,
                representation,
            }
        }
    };
    field.installed = Some(installed);
    Ok(())
}

/// A built subgraph schema.
pub struct SubgraphSchema {
    mode: Option<InjectMode>,
    types: IndexMap<String, (ObjectType, Vec<String>)>,
}

impl SubgraphSchema {
    pub fn mode(&self) -> Option<InjectMode> {
        self.mode
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name).map(|(object, _)| object)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.object_type(type_name)
            .and_then(|object| object.field_definition(field_name))
    }

    /// Resolve `type_name.field_name` on `parent`, the way the execution engine would.
    pub async fn resolve_field(
        &self,
        type_name: &str,
        field_name: &str,
        parent: &Object,
        arguments: Object,
        context: &Context,
    ) -> Result<Value, ResolverError> {
        let (object, key_fields) = self
            .types
            .get(type_name)
            .ok_or_else(|| ResolverError::new(format!("unknown type '{type_name}'")))?;
        let field = object.field_definition(field_name).ok_or_else(|| {
            ResolverError::new(format!("unknown field '{type_name}.{field_name}'"))
        })?;
        let info = ResolveInfo {
            parent_type: type_name.to_string(),
            field_name: field_name.to_string(),
            key_fields: key_fields.clone(),
        };
        field
            .resolver
            .resolve(parent, FieldArguments::new(arguments), context, &info)
            .await
    }
}

impl fmt::Display for SubgraphSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{INJECT_DIRECTIVE_DEFINITIONS}")?;
        for (object, _) in self.types.values() {
            write!(f, "\n\n")?;
            object.write_sdl(f)?;
        }
        writeln!(f)
    }
}

impl fmt::Debug for SubgraphSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubgraphSchema")
            .field("mode", &self.mode)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}
