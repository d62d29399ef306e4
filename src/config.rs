use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Connection settings for the S3-compatible media host.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base used to build public object URLs. Falls back to `endpoint/bucket`.
    pub public_base_url: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
    pub cors_origin: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub json_body_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET")
                .context("ACCESS_TOKEN_SECRET is not set")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")
                .context("REFRESH_TOKEN_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userauth-clients".into()),
            access_ttl_minutes: env_parse("ACCESS_TOKEN_EXPIRY_MINUTES", 15),
            refresh_ttl_minutes: env_parse("REFRESH_TOKEN_EXPIRY_MINUTES", 60 * 24 * 14),
        };
        let media = MediaConfig {
            endpoint: std::env::var("MEDIA_ENDPOINT").context("MEDIA_ENDPOINT is not set")?,
            bucket: std::env::var("MEDIA_BUCKET").context("MEDIA_BUCKET is not set")?,
            access_key: std::env::var("MEDIA_ACCESS_KEY").context("MEDIA_ACCESS_KEY is not set")?,
            secret_key: std::env::var("MEDIA_SECRET_KEY").context("MEDIA_SECRET_KEY is not set")?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_base_url: std::env::var("MEDIA_PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            prefix: std::env::var("MEDIA_PREFIX").unwrap_or_else(|_| "users".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            media,
            cors_origin: std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".into()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public/temp")),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            json_body_limit: env_parse("JSON_BODY_LIMIT", 16 * 1024),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok(), default)
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_uses_value_when_valid() {
        assert_eq!(parse_or(Some(" 30 ".into()), 15i64), 30);
    }

    #[test]
    fn parse_or_falls_back_on_missing_or_garbage() {
        assert_eq!(parse_or::<i64>(None, 15), 15);
        assert_eq!(parse_or(Some("fifteen".into()), 15i64), 15);
        assert_eq!(parse_or(Some("-1".into()), 16usize), 16);
    }
}
