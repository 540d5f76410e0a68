use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::database::{Db, Session};
use crate::dispatch::stages::{AuthStage, DatabaseStage, SchemaStage, SessionMode, SessionSpec};
use crate::dispatch::ActionError;
use crate::schema::Schema;

/// Execution environment threaded through the stage chain to the handler.
pub struct ActionContext {
    pub module: String,
    pub action: String,
    /// Raw Authorization header value, if the request carried one.
    pub authorization: Option<String>,
    /// Parsed JSON body, if the request carried one.
    pub payload: Option<Value>,
    session: Option<Session>,
}

impl ActionContext {
    pub fn new(
        module: impl Into<String>,
        action: impl Into<String>,
        authorization: Option<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
            authorization,
            payload,
            session: None,
        }
    }

    /// Deserialize the validated payload into the handler's parameter
    /// type. An absent payload maps to an empty JSON object, so optional
    /// parameter structs work without a body.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        let value = self
            .payload
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value).map_err(|e| {
            ActionError::Internal(anyhow::anyhow!(
                "payload does not match handler parameters: {}",
                e
            ))
        })
    }

    /// View over the session injected for this route.
    pub fn db(&mut self) -> Result<Db<'_>, ActionError> {
        match self.session.as_mut() {
            Some(session) => Ok(Db::new(session)),
            None => Err(ActionError::Internal(anyhow::anyhow!(
                "no database session was injected for this route"
            ))),
        }
    }

    pub(crate) fn put_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub(crate) fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }
}

/// One unit of business logic, invoked at the end of the stage chain.
/// Stages themselves implement this too, which is what makes the chain
/// composable.
#[async_trait]
pub trait Action: Send + Sync {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError>;
}

/// Declarative route description. `compile` (called by the table builder)
/// folds the configured stages around the handler in the fixed order:
/// authentication, schema validation, session injection / transaction
/// scope, handler body.
pub struct Route {
    name: String,
    handler: Arc<dyn Action>,
    bearer: Option<String>,
    schema: Option<Arc<dyn Schema>>,
    database: Option<(String, bool)>,
    transactional: bool,
}

impl Route {
    pub fn new(name: impl Into<String>, handler: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            bearer: None,
            schema: None,
            database: None,
            transactional: false,
        }
    }

    /// Require a bearer token equal to `secret`.
    pub fn bearer(mut self, secret: impl Into<String>) -> Self {
        self.bearer = Some(secret.into());
        self
    }

    /// Validate the payload against `schema` before the handler runs.
    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Inject a session for the named datastore. `named` grants `:name`
    /// placeholder support on that session.
    pub fn database(mut self, datastore: impl Into<String>, named: bool) -> Self {
        self.database = Some((datastore.into(), named));
        self
    }

    /// Wrap the handler in a transaction scope on the injected session:
    /// commit on success, roll back on any failure.
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    fn compile(self) -> RouteEntry {
        let mut pipeline = self.handler;
        if let Some((datastore, named)) = self.database {
            let mode = if self.transactional {
                SessionMode::Transactional
            } else {
                SessionMode::Autocommit
            };
            let spec = SessionSpec {
                datastore,
                named,
                mode,
            };
            pipeline = Arc::new(DatabaseStage::new(spec, pipeline));
        }
        if let Some(schema) = self.schema {
            pipeline = Arc::new(SchemaStage::new(schema, pipeline));
        }
        if let Some(secret) = self.bearer {
            pipeline = Arc::new(AuthStage::new(secret, pipeline));
        }
        RouteEntry {
            name: self.name,
            pipeline,
        }
    }
}

/// A compiled route: name plus its stage chain.
pub struct RouteEntry {
    name: String,
    pipeline: Arc<dyn Action>,
}

impl RouteEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        self.pipeline.call(ctx).await
    }
}

/// Immutable action name -> compiled route mapping. Built once during
/// startup; lookups are case-sensitive exact matches and safe to run
/// concurrently.
pub struct RouteTable {
    routes: HashMap<String, RouteEntry>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder {
            routes: HashMap::new(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&RouteEntry> {
        self.routes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

pub struct RouteTableBuilder {
    routes: HashMap<String, RouteEntry>,
}

impl RouteTableBuilder {
    /// Register a route. Names are unique within a table; a duplicate is
    /// a startup bug and panics rather than silently shadowing.
    pub fn register(mut self, route: Route) -> Self {
        let entry = route.compile();
        let name = entry.name().to_string();
        if self.routes.insert(name.clone(), entry).is_some() {
            panic!("duplicate route registration: {:?}", name);
        }
        self
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
        }
    }
}

/// Module name -> route table, handed to the HTTP layer at startup.
pub struct Registry {
    modules: HashMap<String, RouteTable>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            modules: HashMap::new(),
        }
    }

    pub fn module(&self, name: &str) -> Option<&RouteTable> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &RouteTable)> {
        self.modules
            .iter()
            .map(|(name, table)| (name.as_str(), table))
    }
}

pub struct RegistryBuilder {
    modules: HashMap<String, RouteTable>,
}

impl RegistryBuilder {
    /// Register a module's route table. Module names are unique; a
    /// duplicate is a startup bug and panics rather than silently
    /// shadowing.
    pub fn module(mut self, name: impl Into<String>, table: RouteTable) -> Self {
        let name = name.into();
        if self.modules.insert(name.clone(), table).is_some() {
            panic!("duplicate module registration: {:?}", name);
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            modules: self.modules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Action for Echo {
        async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
            Ok(ctx.payload.clone().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn test_resolve_is_exact_and_case_sensitive() {
        let table = RouteTable::builder()
            .register(Route::new("foo", Echo))
            .build();

        assert!(table.resolve("foo").is_some());
        assert!(table.resolve("Foo").is_none());
        assert!(table.resolve("foo ").is_none());
        assert!(table.resolve("bar").is_none());
    }

    #[test]
    fn test_empty_name_is_a_valid_route() {
        let table = RouteTable::builder()
            .register(Route::new("", Echo))
            .build();

        assert!(table.resolve("").is_some());
        assert!(table.resolve("anything").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate route registration")]
    fn test_duplicate_registration_panics() {
        let _ = RouteTable::builder()
            .register(Route::new("foo", Echo))
            .register(Route::new("foo", Echo))
            .build();
    }

    #[test]
    #[should_panic(expected = "duplicate module registration")]
    fn test_duplicate_module_registration_panics() {
        let table = || RouteTable::builder().register(Route::new("foo", Echo)).build();
        let _ = Registry::builder()
            .module("m", table())
            .module("m", table())
            .build();
    }

    #[test]
    fn test_params_defaults_to_empty_object() {
        #[derive(serde::Deserialize)]
        struct Params {
            #[serde(default)]
            name: Option<String>,
        }

        let ctx = ActionContext::new("m", "a", None, None);
        let params: Params = ctx.params().unwrap();
        assert!(params.name.is_none());

        let ctx = ActionContext::new("m", "a", None, Some(json!({"name": "alice"})));
        let params: Params = ctx.params().unwrap();
        assert_eq!(params.name.as_deref(), Some("alice"));
    }
}
