//! Field resolvers and the registry the executor looks them up in.
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use apollo_compiler::Name;
use futures::stream::BoxStream;
use serde_json_bytes::Value;

use crate::error::FieldError;
use crate::execution::ExecutionId;
use crate::json_ext::Object;
use crate::path::ResultPath;
use crate::spec::TYPENAME;

/// The events of a subscription source stream.
pub type EventStream = BoxStream<'static, Result<Value, FieldError>>;

/// Everything a resolver knows about the field it resolves.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ResolverContext {
    /// The resolved value of the parent object, or the root value for root fields.
    pub source: Value,
    /// The field arguments, coerced against the field definition.
    pub arguments: Object,
    /// The schema name of the field, which is not necessarily its response key.
    pub field_name: Name,
    /// The object type the field is resolved on.
    pub parent_type: Name,
    /// Where the value will be placed in the response.
    pub path: ResultPath,
    /// The request variables.
    pub variables: Arc<Object>,
    /// The execution this field belongs to.
    pub execution_id: ExecutionId,
}

impl ResolverContext {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

/// Resolves the value of a field.
///
/// Closures taking a [`ResolverContext`] and returning a future implement this trait.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, context: ResolverContext) -> Result<Value, FieldError>;
}

#[async_trait::async_trait]
impl<F, Fut> Resolver for F
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send,
{
    async fn resolve(&self, context: ResolverContext) -> Result<Value, FieldError> {
        self(context).await
    }
}

/// Resolves the source stream of a subscription root field.
#[async_trait::async_trait]
pub trait SubscriptionResolver: Send + Sync + 'static {
    async fn subscribe(&self, context: ResolverContext) -> Result<EventStream, FieldError>;
}

#[async_trait::async_trait]
impl<F, Fut> SubscriptionResolver for F
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<EventStream, FieldError>> + Send,
{
    async fn subscribe(&self, context: ResolverContext) -> Result<EventStream, FieldError> {
        self(context).await
    }
}

/// Picks the object type of a value whose static type is an interface or a union.
pub trait TypeResolver: Send + Sync + 'static {
    fn resolve_type(&self, value: &Value, abstract_type: &Name) -> Option<String>;
}

impl<F> TypeResolver for F
where
    F: Fn(&Value, &Name) -> Option<String> + Send + Sync + 'static,
{
    fn resolve_type(&self, value: &Value, abstract_type: &Name) -> Option<String> {
        self(value, abstract_type)
    }
}

/// Reads `__typename` from the value.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypenameTypeResolver;

impl TypeResolver for TypenameTypeResolver {
    fn resolve_type(&self, value: &Value, _abstract_type: &Name) -> Option<String> {
        value
            .as_object()?
            .get(TYPENAME)?
            .as_str()
            .map(str::to_string)
    }
}

/// Resolvers keyed by type name and field name.
///
/// Fields without a registered resolver read the property named after the field from
/// their parent value.
#[derive(Clone, Default)]
pub struct Resolvers {
    fields: HashMap<String, HashMap<String, Arc<dyn Resolver>>>,
    subscriptions: HashMap<String, HashMap<String, Arc<dyn SubscriptionResolver>>>,
    type_resolvers: HashMap<String, Arc<dyn TypeResolver>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the resolver of `type_name.field_name`.
    pub fn field(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl Resolver,
    ) -> Self {
        self.fields
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), Arc::new(resolver));
        self
    }

    /// Registers the source stream resolver of a subscription root field.
    pub fn subscription(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl SubscriptionResolver,
    ) -> Self {
        self.subscriptions
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), Arc::new(resolver));
        self
    }

    /// Registers how values of an interface or union are mapped to object types.
    pub fn type_resolver(
        mut self,
        abstract_type: impl Into<String>,
        resolver: impl TypeResolver,
    ) -> Self {
        self.type_resolvers
            .insert(abstract_type.into(), Arc::new(resolver));
        self
    }

    pub(crate) fn resolver(&self, type_name: &str, field_name: &str) -> Option<&dyn Resolver> {
        self.fields
            .get(type_name)?
            .get(field_name)
            .map(|resolver| resolver.as_ref())
    }

    pub(crate) fn subscription_resolver(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&dyn SubscriptionResolver> {
        self.subscriptions
            .get(type_name)?
            .get(field_name)
            .map(|resolver| resolver.as_ref())
    }

    pub(crate) fn resolve_type(&self, value: &Value, abstract_type: &Name) -> Option<String> {
        match self.type_resolvers.get(abstract_type.as_str()) {
            Some(resolver) => resolver.resolve_type(value, abstract_type),
            None => TypenameTypeResolver.resolve_type(value, abstract_type),
        }
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn count<T>(map: &HashMap<String, HashMap<String, T>>) -> usize {
            map.values().map(HashMap::len).sum()
        }
        f.debug_struct("Resolvers")
            .field("fields", &count(&self.fields))
            .field("subscriptions", &count(&self.subscriptions))
            .field("type_resolvers", &self.type_resolvers.len())
            .finish()
    }
}

/// The value of a field without a registered resolver.
pub(crate) fn default_resolve(context: &ResolverContext) -> Value {
    context
        .source
        .as_object()
        .and_then(|source| source.get(context.field_name.as_str()))
        .cloned()
        .unwrap_or_default()
}
