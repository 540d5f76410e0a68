use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;

/// Name of the datastore backing routes that do not pick one explicitly.
pub const DEFAULT_DATASTORE: &str = "default";

/// Env prefix for additional named datastores, e.g. DBAPI_DB_REPORTING=postgres://...
const DATASTORE_ENV_PREFIX: &str = "DBAPI_DB_";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// Shared secret compared against the Authorization bearer token.
    pub bearer: String,
    pub log_level: String,
    /// Datastore name -> Postgres connection URL.
    pub datastores: HashMap<String, String>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = environment_from(env::var("ENVIRONMENT").ok().as_deref());

        let mut config = Self {
            environment,
            bearer: env::var("BEARER").unwrap_or_default(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            datastores: datastores_from(env::vars()),
            database: DatabaseConfig {
                max_connections: 5,
                connection_timeout_secs: 30,
            },
        };

        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = v.parse().unwrap_or(config.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            config.database.connection_timeout_secs =
                v.parse().unwrap_or(config.database.connection_timeout_secs);
        }

        config
    }
}

fn environment_from(value: Option<&str>) -> Environment {
    match value {
        Some("production") | Some("prod") => Environment::Production,
        _ => Environment::Local,
    }
}

/// Build the datastore map from environment variables: DATABASE_URL becomes
/// the "default" entry, DBAPI_DB_<NAME> entries register extra datastores
/// under the lowercased name.
fn datastores_from(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    let mut datastores = HashMap::new();
    for (key, value) in vars {
        if key == "DATABASE_URL" {
            datastores.insert(DEFAULT_DATASTORE.to_string(), value);
        } else if let Some(name) = key.strip_prefix(DATASTORE_ENV_PREFIX) {
            if !name.is_empty() {
                datastores.insert(name.to_lowercase(), value);
            }
        }
    }
    datastores
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
