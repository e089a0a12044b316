pub mod graphql;
pub mod login;
pub mod session;

use crate::model::Post;
use async_trait::async_trait;
use thiserror::Error;

/// Bearer token the platform's own web client authenticates with
pub const WEB_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
const TIMEOUT_SEC: u64 = 10;

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Session was rejected ({0}): {1}")]
    Unauthorized(u16, String),
    #[error("Response was not successful: {0}\n{1}")]
    BadResponse(u16, String),
    #[error("Error performing HTTP request: {0}")]
    RequestError(
        #[source]
        #[from]
        reqwest::Error,
    ),
    #[error("Unable to deserialize response: {0}")]
    InvalidResponse(String),
    #[error("Login failed: {0}")]
    Login(String),
}

impl TwitterError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TwitterError::Unauthorized(..))
    }
}

#[async_trait]
pub trait TwitterClient: Send + Sync {
    /// The `count` most recent posts of `user_id`, newest first
    async fn get_user_tweets(&self, user_id: u64, count: usize) -> Result<Vec<Post>, TwitterError>;
}

/// Maps a non-success status to the matching error, keeping the body for context
pub(crate) fn check_status(status: reqwest::StatusCode, text: &str) -> Result<(), TwitterError> {
    let code = status.as_u16();
    match code {
        200..=299 => Ok(()),
        401 | 403 => Err(TwitterError::Unauthorized(code, text.to_string())),
        _ => Err(TwitterError::BadResponse(code, text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn rejected_sessions_are_unauthorized() {
        assert!(check_status(StatusCode::OK, "").is_ok());
        assert!(check_status(StatusCode::UNAUTHORIZED, "nope")
            .unwrap_err()
            .is_unauthorized());
        assert!(check_status(StatusCode::FORBIDDEN, "nope")
            .unwrap_err()
            .is_unauthorized());
        let err = check_status(StatusCode::TOO_MANY_REQUESTS, "slow down").unwrap_err();
        assert!(!err.is_unauthorized());
        assert!(matches!(err, TwitterError::BadResponse(429, _)));
    }
}
