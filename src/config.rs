use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub domain: String,
    pub upload_dir: String,
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
    pub jwt_secret: String,
    pub rate_limit_capacity: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_idle_ttl_secs: u64,
    pub free_plan_bytes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/forge_uploader".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            domain: env::var("DOMAIN").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_file_size: env::var("MAX_FILE_SIZE")
                .unwrap_or_else(|_| "10485760".to_string()) // 10MB
                .parse()?,
            allowed_mime_types: env::var("ALLOWED_MIME_TYPES")
                .unwrap_or_else(|_| "image/jpeg,image/png,application/pdf".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key".to_string()),
            rate_limit_capacity: env::var("RATE_LIMIT_CAPACITY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .unwrap_or_else(|_| "86400".to_string()) // 24 hours
                .parse()?,
            rate_limit_idle_ttl_secs: env::var("RATE_LIMIT_IDLE_TTL")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()?,
            free_plan_bytes: env::var("FREE_PLAN_BYTES")
                .unwrap_or_else(|_| "1073741824".to_string()) // 1GB
                .parse()?,
        })
    }
}
