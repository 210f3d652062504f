use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use mersal_api::email::SmtpConfig;
use mersal_media::CloudinaryConfig;

/// JWT secrets that ship in sample env files and must never reach a deployment.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret",
];

const DEV_SECRET: &str = "dev-secret-change-me";

const DEFAULT_AUTH_RATE_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub production: bool,
    pub jwt_secret: String,
    pub client_url: String,
    pub static_dir: Option<PathBuf>,
    /// Requests per minute per client IP on the auth routes; 0 disables
    pub auth_rate_limit: u32,
    pub cloudinary: Option<CloudinaryConfig>,
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = match get("MERSAL_ENV").as_deref() {
            None | Some("development") => false,
            Some("production") => true,
            Some(other) => bail!("MERSAL_ENV must be 'development' or 'production', got '{other}'"),
        };

        let jwt_secret = match get("MERSAL_JWT_SECRET") {
            Some(secret) if production && PLACEHOLDER_SECRETS.contains(&secret.as_str()) => {
                bail!("MERSAL_JWT_SECRET is still a placeholder; set a random secret")
            }
            Some(secret) => secret,
            None if production => bail!("MERSAL_JWT_SECRET is required in production"),
            None => DEV_SECRET.to_string(),
        };

        let port = match get("MERSAL_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MERSAL_PORT is not a valid port: '{raw}'"))?,
            None => 3000,
        };

        let auth_rate_limit = match get("MERSAL_AUTH_RATE_LIMIT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MERSAL_AUTH_RATE_LIMIT is not a number: '{raw}'"))?,
            None => DEFAULT_AUTH_RATE_LIMIT,
        };

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: get("CLOUDINARY_FOLDER"),
            }),
            (None, None, None) => None,
            _ => bail!(
                "CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set together"
            ),
        };

        let smtp = match get("MERSAL_SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                user: get("MERSAL_SMTP_USER").unwrap_or_default(),
                password: get("MERSAL_SMTP_PASSWORD").unwrap_or_default(),
                from: get("MERSAL_MAIL_FROM")
                    .context("MERSAL_MAIL_FROM is required when MERSAL_SMTP_HOST is set")?,
            }),
            None => None,
        };

        Ok(Self {
            host: get("MERSAL_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("MERSAL_DB_PATH").unwrap_or_else(|| "mersal.db".into()).into(),
            production,
            jwt_secret,
            client_url: get("MERSAL_CLIENT_URL").unwrap_or_else(|| "http://localhost:5173".into()),
            static_dir: get("MERSAL_STATIC_DIR").map(PathBuf::from),
            auth_rate_limit,
            cloudinary,
            smtp,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn development_defaults() {
        let config = config(&[]).unwrap();
        assert!(!config.production);
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("mersal.db"));
        assert_eq!(config.jwt_secret, DEV_SECRET);
        assert_eq!(config.client_url, "http://localhost:5173");
        assert!(config.cloudinary.is_none());
        assert!(config.smtp.is_none());
        assert_eq!(config.auth_rate_limit, 100);
        assert_eq!(config.addr().unwrap().port(), 3000);
    }

    #[test]
    fn production_requires_real_secret() {
        assert!(config(&[("MERSAL_ENV", "production")]).is_err());
        assert!(
            config(&[("MERSAL_ENV", "production"), ("MERSAL_JWT_SECRET", "dev-secret-change-me")])
                .is_err()
        );

        let config = config(&[
            ("MERSAL_ENV", "production"),
            ("MERSAL_JWT_SECRET", "9f2c1e7a0b"),
        ])
        .unwrap();
        assert!(config.production);
        assert_eq!(config.jwt_secret, "9f2c1e7a0b");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("MERSAL_ENV", "staging")]).is_err());
        assert!(config(&[("MERSAL_PORT", "not-a-port")]).is_err());
        assert!(config(&[("MERSAL_AUTH_RATE_LIMIT", "-1")]).is_err());
        assert!(config(&[("CLOUDINARY_CLOUD_NAME", "demo")]).is_err());
        assert!(config(&[("MERSAL_SMTP_HOST", "smtp.example.com")]).is_err());
    }

    #[test]
    fn optional_integrations() {
        let config = config(&[
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
            ("MERSAL_SMTP_HOST", "smtp.example.com"),
            ("MERSAL_MAIL_FROM", "Mersal <hello@example.com>"),
            ("MERSAL_STATIC_DIR", "  "),
        ])
        .unwrap();
        assert_eq!(config.cloudinary.unwrap().cloud_name, "demo");
        assert_eq!(config.smtp.unwrap().host, "smtp.example.com");
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn auth_rate_limit_can_be_disabled() {
        let config = config(&[("MERSAL_AUTH_RATE_LIMIT", "0")]).unwrap();
        assert_eq!(config.auth_rate_limit, 0);
    }
}
