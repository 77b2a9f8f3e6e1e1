//! Field resolvers, and the wrapper that injects sub-query results into them.
//!
//! A wrapped resolver receives one extra argument next to the client's own:
//! [`INJECT_PROMISE`] in background mode, [`INJECT_INVOKE`] in on-demand mode.
//! Its return value and its errors pass through the wrapper untouched.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::future::IntoFuture;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use tokio::sync::OnceCell;
use tower::Service;
use tower::ServiceExt;

use crate::client::BoxService;
use crate::client::SubqueryResult;
use crate::directive::InjectionSpec;
use crate::directive::WrapMode;
use crate::entity_key::EntityKey;
use crate::error::FetchError;
use crate::error::ResolverError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::subquery::Subquery;
use crate::subquery::SubqueryBuilder;

/// Argument carrying the [`InjectHandle`] of a background sub-query.
pub const INJECT_PROMISE: &str = "injectPromise";
/// Argument carrying the [`InjectInvoker`] of an on-demand sub-query.
pub const INJECT_INVOKE: &str = "injectInvoke";
/// Field holding the concrete type name of an entity representation.
pub const TYPENAME: &str = "__typename";

pub type BoxResolver = Arc<dyn Resolver>;

/// Produces the value of one field.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        parent: &Object,
        args: FieldArguments,
        context: &Context,
        info: &ResolveInfo,
    ) -> Result<Value, ResolverError>;
}

/// Per-request data shared by every resolver of an operation.
#[derive(Default, Clone)]
pub struct Context {
    content: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.content.get(name).and_then(|d| d.downcast_ref())
    }

    pub fn insert<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        value: T,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.content.insert(name.to_string(), Arc::new(value))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.content.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Where in the schema a field is being resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveInfo {
    /// The type declaring the field.
    pub parent_type: String,
    /// The field being resolved.
    pub field_name: String,
    /// The `@key` fields of the parent type, empty for non-entities.
    pub key_fields: Vec<String>,
}

/// The arguments a resolver is invoked with.
#[derive(Clone, Debug, Default)]
pub struct FieldArguments {
    values: Object,
    injection: Option<PendingInjection>,
}

impl FieldArguments {
    pub fn new(values: Object) -> Self {
        Self {
            values,
            injection: None,
        }
    }

    /// A client-supplied argument.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Object {
        &self.values
    }

    /// The `injectPromise` argument, present on fields wrapped in background mode.
    pub fn inject_promise(&self) -> Option<&InjectHandle> {
        match &self.injection {
            Some(PendingInjection::Background(handle)) => Some(handle),
            _ => None,
        }
    }

    /// The `injectInvoke` argument, present on fields wrapped in on-demand mode.
    pub fn inject_invoke(&self) -> Option<&InjectInvoker> {
        match &self.injection {
            Some(PendingInjection::OnDemand(invoker)) => Some(invoker),
            _ => None,
        }
    }

    pub fn injection(&self) -> Option<&PendingInjection> {
        self.injection.as_ref()
    }

    pub(crate) fn attach(&mut self, injection: PendingInjection) {
        // the reserved names always refer to the injected value
        self.values.remove(INJECT_PROMISE);
        self.values.remove(INJECT_INVOKE);
        self.injection = Some(injection);
    }
}

impl From<Object> for FieldArguments {
    fn from(values: Object) -> Self {
        Self::new(values)
    }
}

/// The injected argument, in whichever form the field's mode hands out.
#[derive(Clone, Debug)]
pub enum PendingInjection {
    Background(InjectHandle),
    OnDemand(InjectInvoker),
}

impl PendingInjection {
    /// The argument name this injection is passed under.
    pub fn reserved_name(&self) -> &'static str {
        match self {
            PendingInjection::Background(_) => INJECT_PROMISE,
            PendingInjection::OnDemand(_) => INJECT_INVOKE,
        }
    }

    /// Wait for the sub-query, issuing it first if it was deferred.
    pub async fn resolve(&self) -> SubqueryResult {
        match self {
            PendingInjection::Background(handle) => handle.wait().await,
            PendingInjection::OnDemand(invoker) => invoker.invoke().await,
        }
    }
}

/// A sub-query already in flight.
///
/// Every clone observes the same single request and the same outcome.
#[derive(Clone)]
pub struct InjectHandle {
    outcome: Shared<BoxFuture<'static, SubqueryResult>>,
}

impl InjectHandle {
    /// Issue `subquery` on `service` and keep polling it in the background.
    ///
    /// The request has been handed to the service when this returns, whether
    /// or not anybody ever awaits the handle.
    pub(crate) async fn start(service: BoxService, subquery: Subquery) -> Self {
        let response = dispatch(service, subquery).await;
        let task = tokio::spawn(response);
        Self::from_future(async move {
            task.await.unwrap_or_else(|error| {
                SubqueryResult::Unavailable(FetchError::from_dispatch(error))
            })
        })
    }

    pub(crate) fn ready(result: SubqueryResult) -> Self {
        Self::from_future(futures::future::ready(result))
    }

    fn from_future(outcome: impl Future<Output = SubqueryResult> + Send + 'static) -> Self {
        Self {
            outcome: outcome.boxed().shared(),
        }
    }

    pub async fn wait(&self) -> SubqueryResult {
        self.outcome.clone().await
    }

    /// The outcome, if the sub-query has completed and the handle was awaited.
    pub fn peek(&self) -> Option<&SubqueryResult> {
        self.outcome.peek()
    }
}

impl IntoFuture for InjectHandle {
    type Output = SubqueryResult;
    type IntoFuture = Shared<BoxFuture<'static, SubqueryResult>>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

impl fmt::Debug for InjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectHandle")
            .field("outcome", &self.peek())
            .finish()
    }
}

async fn dispatch(
    mut service: BoxService,
    subquery: Subquery,
) -> BoxFuture<'static, SubqueryResult> {
    match service.ready().await {
        Ok(service) => {
            tracing::debug!(entity = %subquery.key, "dispatching sub-query");
            let response = service.call(subquery);
            async move {
                response
                    .await
                    .unwrap_or_else(|error| SubqueryResult::Unavailable(error.into()))
            }
            .boxed()
        }
        Err(error) => futures::future::ready(SubqueryResult::Unavailable(error.into())).boxed(),
    }
}

/// A deferred sub-query, issued the first time [`InjectInvoker::invoke`] is called.
///
/// Clones share state: however many times or places it is invoked, at most one
/// request is sent and every caller sees its outcome.
#[derive(Clone)]
pub struct InjectInvoker {
    inner: Arc<InvokerState>,
}

struct InvokerState {
    pending: parking_lot::Mutex<Option<(BoxService, Subquery)>>,
    handle: OnceCell<InjectHandle>,
}

impl InjectInvoker {
    pub(crate) fn new(service: BoxService, subquery: Subquery) -> Self {
        Self {
            inner: Arc::new(InvokerState {
                pending: parking_lot::Mutex::new(Some((service, subquery))),
                handle: OnceCell::new(),
            }),
        }
    }

    /// An invoker whose outcome is known up front, it never sends anything.
    pub(crate) fn settled(result: SubqueryResult) -> Self {
        Self {
            inner: Arc::new(InvokerState {
                pending: parking_lot::Mutex::new(None),
                handle: OnceCell::new_with(Some(InjectHandle::ready(result))),
            }),
        }
    }

    pub async fn invoke(&self) -> SubqueryResult {
        let handle = self
            .inner
            .handle
            .get_or_init(|| async {
                // cloned so a cancelled first invocation can be retried
                let pending = self.inner.pending.lock().clone();
                match pending {
                    Some((service, subquery)) => InjectHandle::start(service, subquery).await,
                    None => InjectHandle::ready(SubqueryResult::Unavailable(
                        FetchError::from_dispatch("no sub-query to invoke"),
                    )),
                }
            })
            .await;
        handle.wait().await
    }

    pub fn is_invoked(&self) -> bool {
        self.inner.handle.initialized()
    }
}

impl fmt::Debug for InjectInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectInvoker")
            .field("invoked", &self.is_invoked())
            .finish()
    }
}

/// Resolves a field from the parent property of the same name.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParentFieldResolver;

#[async_trait]
impl Resolver for ParentFieldResolver {
    async fn resolve(
        &self,
        parent: &Object,
        _args: FieldArguments,
        _context: &Context,
        info: &ResolveInfo,
    ) -> Result<Value, ResolverError> {
        Ok(parent
            .get(info.field_name.as_str())
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// A resolver from an async closure over owned inputs.
pub fn resolver_fn<F, Fut>(f: F) -> BoxResolver
where
    F: Fn(Object, FieldArguments, Context, ResolveInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
{
    Arc::new(ResolverFn(f))
}

struct ResolverFn<F>(F);

#[async_trait]
impl<F, Fut> Resolver for ResolverFn<F>
where
    F: Fn(Object, FieldArguments, Context, ResolveInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
{
    async fn resolve(
        &self,
        parent: &Object,
        args: FieldArguments,
        context: &Context,
        info: &ResolveInfo,
    ) -> Result<Value, ResolverError> {
        (self.0)(parent.clone(), args, context.clone(), info.clone()).await
    }
}

/// Wraps a resolver so it is handed the outcome of a sub-query re-fetching
/// sibling fields of its parent entity.
pub struct InjectResolver {
    original: BoxResolver,
    spec: InjectionSpec,
    mode: WrapMode,
    subquery_builder: SubqueryBuilder,
    // BoxCloneService is not Sync
    client: parking_lot::Mutex<BoxService>,
}

impl InjectResolver {
    pub(crate) fn new(
        original: BoxResolver,
        spec: InjectionSpec,
        mode: WrapMode,
        subquery_builder: SubqueryBuilder,
        client: BoxService,
    ) -> Self {
        Self {
            original,
            spec,
            mode,
            subquery_builder,
            client: parking_lot::Mutex::new(client),
        }
    }

    fn entity_key(&self, parent: &Object, info: &ResolveInfo) -> Result<EntityKey, FetchError> {
        let type_name = parent
            .get(TYPENAME)
            .and_then(Value::as_str)
            .unwrap_or(info.parent_type.as_str());
        let key_field = info.key_fields.first().ok_or_else(|| FetchError::MissingEntityKey {
            field: TYPENAME.to_string(),
        })?;
        let primary_value = parent
            .get(key_field.as_str())
            .and_then(ValueExt::as_key_string)
            .ok_or_else(|| FetchError::MissingEntityKey {
                field: key_field.clone(),
            })?;

        Ok(EntityKey::new(type_name, primary_value))
    }

    async fn prepare(&self, parent: &Object, info: &ResolveInfo) -> PendingInjection {
        let subquery = match self.entity_key(parent, info) {
            Ok(key) => self
                .subquery_builder
                .build(&info.parent_type, &key, self.spec.fields()),
            Err(error) => {
                tracing::warn!(
                    parent_type = %info.parent_type,
                    field = %info.field_name,
                    "cannot identify parent entity, injected data is unavailable: {error}"
                );
                let unavailable = SubqueryResult::Unavailable(error);
                return match self.mode {
                    WrapMode::Background => {
                        PendingInjection::Background(InjectHandle::ready(unavailable))
                    }
                    WrapMode::OnDemand => {
                        PendingInjection::OnDemand(InjectInvoker::settled(unavailable))
                    }
                };
            }
        };

        let client = self.client.lock().clone();
        match self.mode {
            WrapMode::Background => {
                PendingInjection::Background(InjectHandle::start(client, subquery).await)
            }
            WrapMode::OnDemand => PendingInjection::OnDemand(InjectInvoker::new(client, subquery)),
        }
    }
}

#[async_trait]
impl Resolver for InjectResolver {
    async fn resolve(
        &self,
        parent: &Object,
        mut args: FieldArguments,
        context: &Context,
        info: &ResolveInfo,
    ) -> Result<Value, ResolverError> {
        let injection = self.prepare(parent, info).await;
        args.attach(injection);
        self.original.resolve(parent, args, context, info).await
    }
}

impl fmt::Debug for InjectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectResolver")
            .field("spec", &self.spec)
            .field("mode", &self.mode)
            .finish()
    }
}
