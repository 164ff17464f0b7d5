use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub default_currency: String,
    pub upload_root: PathBuf,
    pub max_upload_bytes: usize,
    pub payment_timeout_secs: u64,
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PayPalConfig>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub api_base: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let jwt = JwtConfig {
            secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?,
            access_ttl_minutes: parse_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_hours: parse_or("JWT_REFRESH_TTL_HOURS", 24 * 7),
        };

        let stripe = match (
            env::var("STRIPE_SECRET_KEY"),
            env::var("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Ok(secret_key), Ok(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            }),
            _ => None,
        };

        let paypal = match (
            env::var("PAYPAL_CLIENT_ID"),
            env::var("PAYPAL_CLIENT_SECRET"),
            env::var("PAYPAL_WEBHOOK_ID"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(webhook_id)) => Some(PayPalConfig {
                client_id,
                client_secret,
                webhook_id,
                api_base: env::var("PAYPAL_API_BASE")
                    .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt,
            default_currency: env::var("DEFAULT_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|_| "GBP".to_string()),
            upload_root: env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
            payment_timeout_secs: parse_or("PAYMENT_TIMEOUT_SECS", 15),
            stripe,
            paypal,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
