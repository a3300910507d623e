use serde::Deserialize;
use std::env;

const DEFAULT_PISTON_URL: &str = "https://emkc.org/api/v2/piston/execute";
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SUBMISSIONS_PER_MINUTE: u32 = 30;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Redis is optional; without it the submission rate limit is disabled.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub piston_url: String,
    pub execution_timeout_secs: u64,
    pub submissions_per_minute: u32,
    pub bind_addr: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "adventurecode".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let piston_url = settings
            .get_string("execution.piston_url")
            .or_else(|_| env::var("PISTON_URL"))
            .unwrap_or_else(|_| DEFAULT_PISTON_URL.to_string());

        let execution_timeout_secs = settings
            .get_int("execution.timeout_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_EXECUTION_TIMEOUT_SECS);

        let submissions_per_minute = settings
            .get_int("limits.submissions_per_minute")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_SUBMISSIONS_PER_MINUTE);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            piston_url,
            execution_timeout_secs,
            submissions_per_minute,
            bind_addr,
        })
    }

    pub fn execution_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.execution_timeout_secs)
    }
}
