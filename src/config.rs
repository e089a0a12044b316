use crate::store::DEFAULT_KEY;
use crate::twitter::login::decode_totp_secret;
use crate::twitter::session::Credentials;
use crate::unshorten::DEFAULT_TIMEOUT_SEC;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const DEFAULT_USER_ID: u64 = 1561780787346714624;
/// Largest page the timeline endpoint serves
pub const MAX_COUNT: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required value: {0}")]
    MissingField(&'static str),
    #[error("Post count must be between 1 and 100, got {0}")]
    InvalidCount(usize),
    #[error("TOTP secret is not valid base32")]
    InvalidTotpSecret,
    #[error("Invalid Redis URL: {0}")]
    InvalidRedisUrl(#[from] url::ParseError),
    #[error("Unsupported Redis URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Resolve timeout must be at least one second")]
    InvalidTimeout,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Username to log in with
    #[clap(long, env = "TWITTER_USERNAME")]
    pub username: String,
    /// Email confirming the account when the login flow asks for it
    #[clap(long, env = "TWITTER_EMAIL")]
    pub email: String,
    #[clap(long, env = "TWITTER_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Base32 seed for the two-factor one-time codes
    #[clap(long, env = "TWITTER_TOTP_SECRET", hide_env_values = true)]
    pub totp_secret: String,
    /// Numeric id of the account whose posts are published
    #[clap(long, env = "TWITTER_USER_ID", default_value_t = DEFAULT_USER_ID)]
    pub user_id: u64,
    /// Number of recent posts to publish
    #[clap(long, env = "TWEET_COUNT", default_value_t = 10)]
    pub count: usize,
    #[clap(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: String,
    /// List the batch is pushed to
    #[clap(long, env = "REDIS_KEY", default_value = DEFAULT_KEY)]
    pub redis_key: String,
    /// Where the session cookies are kept between runs
    #[clap(long, env = "TWITTER_COOKIES", default_value = "./cookies.json")]
    pub cookies: PathBuf,
    /// Seconds to wait when resolving a shortened link
    #[clap(long, env = "RESOLVE_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SEC)]
    pub resolve_timeout: u64,
}

impl PublishArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("username", &self.username),
            ("email", &self.email),
            ("password", &self.password),
            ("totp secret", &self.totp_secret),
            ("redis key", &self.redis_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name));
            }
        }
        if !(1..=MAX_COUNT).contains(&self.count) {
            return Err(ConfigError::InvalidCount(self.count));
        }
        decode_totp_secret(&self.totp_secret).map_err(|_| ConfigError::InvalidTotpSecret)?;
        validate_redis_url(&self.redis_url)?;
        if self.resolve_timeout == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            totp_secret: self.totp_secret.clone(),
        }
    }
}

#[cfg(feature = "serve")]
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    pub socket: std::net::SocketAddr,
    #[clap(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: String,
    #[clap(long, env = "REDIS_KEY", default_value = DEFAULT_KEY)]
    pub redis_key: String,
}

#[cfg(feature = "serve")]
impl ServeArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_redis_url(&self.redis_url)
    }
}

pub fn validate_redis_url(url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "redis" | "rediss" | "unix" | "redis+unix" => Ok(()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
