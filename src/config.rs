use std::str::FromStr;

use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full DSN; takes precedence over the individual components.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

/// One year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE value: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub store: StoreKind,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: or("APP_HOST", "0.0.0.0"),
            port: parse_or(get("APP_PORT"), "APP_PORT", 8080)?,
        };

        let database = DatabaseConfig {
            url: get("DATABASE_URL"),
            host: or("DB_HOST", "localhost"),
            port: parse_or(get("DB_PORT"), "DB_PORT", 5432)?,
            username: or("DB_USERNAME", "postgres"),
            password: get("DB_PASSWORD").unwrap_or_default(),
            name: or("DB_NAME", "todoapp"),
            ssl_mode: or("DB_SSLMODE", "disable"),
            max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?,
        };

        let jwt = JwtConfig {
            secret: get("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: or("JWT_ISSUER", "todo-backend"),
            audience: or("JWT_AUDIENCE", "todo-backend-users"),
            ttl_hours: parse_or(get("JWT_EXPIRATION_HOURS"), "JWT_EXPIRATION_HOURS", 24)?,
        };
        anyhow::ensure!(
            (1..=MAX_TOKEN_TTL_HOURS).contains(&jwt.ttl_hours),
            "JWT_EXPIRATION_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}"
        );

        let cors = CorsConfig {
            allow_origins: or("CORS_ALLOW_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            allow_credentials: parse_or(get("CORS_ALLOW_CREDENTIALS"), "CORS_ALLOW_CREDENTIALS", true)?,
        };

        let store = match get("STORE") {
            Some(v) => v.parse()?,
            None => StoreKind::Postgres,
        };

        Ok(Self {
            server,
            database,
            jwt,
            cors,
            store,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={v}: {e}")),
        None => Ok(default),
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).context("parse DATABASE_URL");
        }
        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .with_context(|| format!("invalid DB_SSLMODE {}", self.ssl_mode))?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }
}
