use std::env;

use thiserror::Error;

/// Secret used for signing tokens when running locally without `ACCESS_TOKEN_SECRET`.
const LOCAL_TOKEN_SECRET: &str = "forum-local-access-token-secret";
/// Placeholder processor key for local runs. Intents created with it are rejected by the processor.
const LOCAL_PAYMENT_KEY: &str = "sk_test_local_placeholder";

/// AppConfig
///
/// Holds the application's entire configuration state. It is loaded once at startup,
/// never mutated afterwards, and pulled into handlers and extractors via `FromRef`.
#[derive(Clone)]
pub struct AppConfig {
    // MongoDB connection string.
    pub db_uri: String,
    // Database holding every forum collection.
    pub db_name: String,
    // HMAC secret used to sign and verify access tokens.
    pub token_secret: String,
    // Secret key for the payment processor API.
    pub payment_secret: String,
    // TCP port the HTTP server binds to.
    pub port: u16,
    // Runtime environment marker. Controls logging format and secret fallbacks.
    pub env: Env,
}

/// Env
///
/// Defines the runtime context. `Local` tolerates missing secrets with development
/// fallbacks, `Production` refuses to start without them.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} must be set in production")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

impl Default for AppConfig {
    /// Test-friendly configuration that needs no environment variables.
    fn default() -> Self {
        Self {
            db_uri: "mongodb://localhost:27017".to_string(),
            db_name: "ForumTest".to_string(),
            token_secret: "super-secure-test-secret-value-local".to_string(),
            payment_secret: LOCAL_PAYMENT_KEY.to_string(),
            port: 5000,
            env: Env::Local,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment. In production, missing secrets are a
    /// hard error so the server never starts with a guessable signing key.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value: raw,
            })?,
            Err(_) => 5000,
        };

        let db_name = env::var("DB_NAME").unwrap_or_else(|_| "Forum".to_string());

        match env {
            Env::Local => Ok(Self {
                db_uri: resolve_db_uri()
                    .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
                db_name,
                token_secret: env::var("ACCESS_TOKEN_SECRET")
                    .unwrap_or_else(|_| LOCAL_TOKEN_SECRET.to_string()),
                payment_secret: env::var("PAYMENT_SECRET_KEY")
                    .unwrap_or_else(|_| LOCAL_PAYMENT_KEY.to_string()),
                port,
                env: Env::Local,
            }),
            Env::Production => Ok(Self {
                db_uri: resolve_db_uri()?,
                db_name,
                token_secret: required("ACCESS_TOKEN_SECRET")?,
                payment_secret: required("PAYMENT_SECRET_KEY")?,
                port,
                env: Env::Production,
            }),
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

/// Uses `MONGODB_URI` verbatim when present, otherwise assembles an Atlas SRV URI
/// from the credential triple.
fn resolve_db_uri() -> Result<String, ConfigError> {
    if let Ok(uri) = env::var("MONGODB_URI") {
        return Ok(uri);
    }
    let user = required("DB_USER")?;
    let pass = required("DB_PASS")?;
    let cluster = required("DB_CLUSTER")?;
    Ok(format!(
        "mongodb+srv://{user}:{pass}@{cluster}/?retryWrites=true&w=majority"
    ))
}
