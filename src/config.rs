//! Process configuration read once from the environment at startup.
//! A missing database URL or signing secret is a hard startup error; every
//! other knob has a default suitable for local development.

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub db_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds. Default three hours.
    pub jwt_ttl_secs: u64,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let http_port = std::env::var("ROLLCALL_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let db_url = std::env::var("ROLLCALL_DB_URL")
            .context("ROLLCALL_DB_URL is not configured")?;
        let jwt_secret = std::env::var("ROLLCALL_JWT_SECRET")
            .context("ROLLCALL_JWT_SECRET is not configured")?;
        if jwt_secret.trim().is_empty() {
            bail!("ROLLCALL_JWT_SECRET is empty");
        }
        let jwt_ttl_secs = std::env::var("ROLLCALL_JWT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3 * 3600);
        let cors_origin = std::env::var("ROLLCALL_CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        Ok(Self { http_port, db_url, jwt_secret, jwt_ttl_secs, cors_origin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the env mutations below don't race each other.
    #[test]
    fn from_env_defaults_and_required_vars() {
        std::env::remove_var("ROLLCALL_DB_URL");
        std::env::remove_var("ROLLCALL_JWT_SECRET");
        assert!(Config::from_env().is_err(), "missing db url must fail");

        std::env::set_var("ROLLCALL_DB_URL", "postgres://localhost/rollcall");
        assert!(Config::from_env().is_err(), "missing jwt secret must fail");

        std::env::set_var("ROLLCALL_JWT_SECRET", "test-secret");
        std::env::remove_var("ROLLCALL_HTTP_PORT");
        std::env::remove_var("ROLLCALL_JWT_TTL_SECS");
        std::env::remove_var("ROLLCALL_CORS_ORIGIN");
        let cfg = Config::from_env().expect("config with defaults");
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.jwt_ttl_secs, 3 * 3600);
        assert_eq!(cfg.cors_origin, "http://localhost:3000");

        std::env::set_var("ROLLCALL_JWT_SECRET", "   ");
        assert!(Config::from_env().is_err(), "blank jwt secret must fail");

        std::env::remove_var("ROLLCALL_DB_URL");
        std::env::remove_var("ROLLCALL_JWT_SECRET");
    }
}
