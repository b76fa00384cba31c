use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

/// Secret used by the development profile. Refused by `validate` anywhere else.
pub const DEVELOPMENT_JWT_SECRET: &str = "control-plane-development-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub licensing: LicensingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. Without one, development falls back to the in-memory store.
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub default_audit_limit: i64,
    pub max_audit_limit: i64,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub operator_token_hours: i64,
    pub impersonation_token_minutes: i64,
    pub bcrypt_cost: u32,
    /// Key for audit record digests; the JWT secret is used when unset.
    #[serde(skip_serializing)]
    pub audit_signing_key: Option<String>,
    pub cors_origins: Vec<String>,
    pub allow_operator_setup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensingConfig {
    pub expire_sweep_interval_secs: u64,
    pub expiring_soon_days: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a non-default value outside development")]
    InsecureJwtSecret,
    #[error("DATABASE_URL is required outside development")]
    MissingDatabaseUrl,
    #[error("bcrypt cost must be between 4 and 31, got {0}")]
    InvalidBcryptCost(u32),
    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
            lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(current)
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database.url = Some(v);
        }
        self.database.max_connections = parsed(&lookup, "DATABASE_MAX_CONNECTIONS", self.database.max_connections);
        self.database.connection_timeout = parsed(&lookup, "DATABASE_CONNECTION_TIMEOUT", self.database.connection_timeout);
        self.database.run_migrations = parsed(&lookup, "DATABASE_RUN_MIGRATIONS", self.database.run_migrations);

        // API overrides
        let port = lookup("CONTROL_PLANE_PORT").or_else(|| lookup("PORT"));
        if let Some(port) = port.and_then(|p| p.trim().parse().ok()) {
            self.api.port = port;
        }
        self.api.default_audit_limit = parsed(&lookup, "API_DEFAULT_AUDIT_LIMIT", self.api.default_audit_limit);
        self.api.max_audit_limit = parsed(&lookup, "API_MAX_AUDIT_LIMIT", self.api.max_audit_limit);
        self.api.enable_request_logging = parsed(&lookup, "API_ENABLE_REQUEST_LOGGING", self.api.enable_request_logging);

        // Security overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        self.security.operator_token_hours =
            parsed(&lookup, "SECURITY_OPERATOR_TOKEN_HOURS", self.security.operator_token_hours);
        self.security.impersonation_token_minutes = parsed(
            &lookup,
            "SECURITY_IMPERSONATION_TOKEN_MINUTES",
            self.security.impersonation_token_minutes,
        );
        self.security.bcrypt_cost = parsed(&lookup, "SECURITY_BCRYPT_COST", self.security.bcrypt_cost);
        if let Some(v) = lookup("AUDIT_SIGNING_KEY").filter(|v| !v.is_empty()) {
            self.security.audit_signing_key = Some(v);
        }
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self.security.allow_operator_setup =
            parsed(&lookup, "SECURITY_ALLOW_OPERATOR_SETUP", self.security.allow_operator_setup);

        // Licensing overrides
        self.licensing.expire_sweep_interval_secs = parsed(
            &lookup,
            "LICENSING_EXPIRE_SWEEP_INTERVAL_SECS",
            self.licensing.expire_sweep_interval_secs,
        );
        self.licensing.expiring_soon_days =
            parsed(&lookup, "LICENSING_EXPIRING_SOON_DAYS", self.licensing.expiring_soon_days);

        self
    }

    /// Rejects configurations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.environment.is_development() {
            if self.security.jwt_secret.trim().is_empty() || self.security.jwt_secret == DEVELOPMENT_JWT_SECRET {
                return Err(ConfigError::InsecureJwtSecret);
            }
            if self.database.url.is_none() {
                return Err(ConfigError::MissingDatabaseUrl);
            }
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::InvalidBcryptCost(self.security.bcrypt_cost));
        }
        if self.security.operator_token_hours <= 0 {
            return Err(ConfigError::NonPositive("operator token lifetime"));
        }
        if self.security.impersonation_token_minutes <= 0 {
            return Err(ConfigError::NonPositive("impersonation token lifetime"));
        }
        if self.licensing.expire_sweep_interval_secs == 0 {
            return Err(ConfigError::NonPositive("expire sweep interval"));
        }
        Ok(())
    }

    pub fn audit_signing_key(&self) -> &[u8] {
        self.security
            .audit_signing_key
            .as_deref()
            .unwrap_or(&self.security.jwt_secret)
            .as_bytes()
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 3000,
                default_audit_limit: 50,
                max_audit_limit: 500,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                operator_token_hours: 8,
                impersonation_token_minutes: 60,
                bcrypt_cost: 10,
                audit_signing_key: None,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                allow_operator_setup: true,
            },
            licensing: LicensingConfig {
                expire_sweep_interval_secs: 300,
                expiring_soon_days: 7,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 3000,
                default_audit_limit: 50,
                max_audit_limit: 200,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                operator_token_hours: 8,
                impersonation_token_minutes: 60,
                bcrypt_cost: 10,
                audit_signing_key: None,
                cors_origins: vec!["https://admin.staging.example.com".to_string()],
                allow_operator_setup: true,
            },
            licensing: LicensingConfig {
                expire_sweep_interval_secs: 300,
                expiring_soon_days: 7,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                run_migrations: false,
            },
            api: ApiConfig {
                port: 3000,
                default_audit_limit: 50,
                max_audit_limit: 200,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                operator_token_hours: 8,
                impersonation_token_minutes: 30,
                bcrypt_cost: 12,
                audit_signing_key: None,
                cors_origins: vec!["https://admin.example.com".to_string()],
                allow_operator_setup: false,
            },
            licensing: LicensingConfig {
                expire_sweep_interval_secs: 60,
                expiring_soon_days: 7,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.database.url.is_none());
        assert_eq!(config.security.operator_token_hours, 8);
        assert!(config.security.allow_operator_setup);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_default_production_config_requires_secrets() {
        let config = AppConfig::production();
        assert!(!config.security.allow_operator_setup);
        assert_eq!(config.validate(), Err(ConfigError::InsecureJwtSecret));

        let config = AppConfig::production().with_overrides(lookup_from(&[("JWT_SECRET", "s3cr3t-for-prod")]));
        assert_eq!(config.validate(), Err(ConfigError::MissingDatabaseUrl));

        let config = AppConfig::production().with_overrides(lookup_from(&[
            ("JWT_SECRET", "s3cr3t-for-prod"),
            ("DATABASE_URL", "postgres://cp:cp@db/control_plane"),
        ]));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let config = AppConfig::development().with_overrides(lookup_from(&[
            ("PORT", "8088"),
            ("SECURITY_BCRYPT_COST", "not-a-number"),
            ("SECURITY_IMPERSONATION_TOKEN_MINUTES", "15"),
            ("SECURITY_CORS_ORIGINS", "https://a.example, ,https://b.example"),
            ("AUDIT_SIGNING_KEY", "audit-key"),
        ]));
        assert_eq!(config.api.port, 8088);
        assert_eq!(config.security.bcrypt_cost, 10);
        assert_eq!(config.security.impersonation_token_minutes, 15);
        assert_eq!(config.security.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.audit_signing_key(), b"audit-key");
    }

    #[test]
    fn bcrypt_cost_is_bounded() {
        let mut config = AppConfig::development();
        config.security.bcrypt_cost = 2;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBcryptCost(2)));
    }
}
