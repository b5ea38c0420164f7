use std::env;
use std::net::SocketAddr;

use secrecy::SecretString;
use thiserror::Error;

use crate::services::issuance::{BundleRule, IssuancePolicy};

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;
const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    pub stripe_api_base: String,
    pub signature_tolerance_secs: i64,
    pub jwt_secret: SecretString,
    pub issuance: IssuancePolicy,
    pub expo_push_url: String,
    pub cors_allowed_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let store_backend = match var("STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE",
                    reason: format!("unknown backend '{other}'"),
                })
            }
        };

        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections = parse_or(
            "DATABASE_MAX_CONNECTIONS",
            var("DATABASE_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let bind_addr = parse_or(
            "BIND_ADDR",
            var("BIND_ADDR"),
            DEFAULT_BIND_ADDR
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    name: "BIND_ADDR",
                    reason: e.to_string(),
                })?,
        )?;
        let signature_tolerance_secs = parse_or(
            "STRIPE_SIGNATURE_TOLERANCE_SECS",
            var("STRIPE_SIGNATURE_TOLERANCE_SECS"),
            DEFAULT_SIGNATURE_TOLERANCE_SECS,
        )?;

        let bundles = match var("BUNDLE_PRICES") {
            Some(table) => BundleRule::parse_table(&table).map_err(|reason| ConfigError::Invalid {
                name: "BUNDLE_PRICES",
                reason,
            })?,
            None => Vec::new(),
        };

        let mut issuance = IssuancePolicy::new(bundles);
        if let Some(ticket_type) = var("DEFAULT_TICKET_TYPE") {
            issuance.default_ticket_type = ticket_type;
        }
        issuance.event_name = var("EVENT_NAME");
        issuance.event_date = var("EVENT_DATE");

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections,
            bind_addr,
            stripe_secret_key: SecretString::from(required("STRIPE_SECRET_KEY")?),
            stripe_webhook_secret: SecretString::from(required("STRIPE_WEBHOOK_SECRET")?),
            stripe_api_base: var("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            signature_tolerance_secs,
            jwt_secret: SecretString::from(required("JWT_SECRET")?),
            issuance,
            expo_push_url: var("EXPO_PUSH_URL").unwrap_or_else(|| DEFAULT_EXPO_PUSH_URL.to_string()),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
