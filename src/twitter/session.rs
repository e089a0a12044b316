//! Persisted login state.
//!
//! A session is the platform's cookie set, stored as a flat JSON object so an
//! existing `cookies.json` can be reused. Restoring a stored session skips the
//! interactive login entirely.

use crate::twitter::TwitterError;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

const AUTH_COOKIE: &str = "auth_token";
const CSRF_COOKIE: &str = "ct0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn from_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses a `Cookie` request header value (`a=1; b=2`)
    pub fn from_cookie_header(header: &str) -> Self {
        Self::from_cookies(header.split(';').filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        }))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.get(CSRF_COOKIE)
    }

    /// Both the auth cookie and the CSRF cookie are needed for API calls
    pub fn is_usable(&self) -> bool {
        self.get(AUTH_COOKIE).is_some() && self.csrf_token().is_some()
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub async fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)
            .await
            .context("Unable to read session file")?;
        let session =
            serde_json::from_str::<Self>(&text).context("Unable to deserialize session file")?;
        Ok(Some(session))
    }

    /// Writes the session next to its destination, then moves it into place
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&parent).context("Unable to create session file")?;
        let json = serde_json::to_vec_pretty(self)?;
        temp.write_all(&json).context("Unable to write session file")?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|e| e.error)
            .context("Unable to save session file")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
    pub totp_secret: String,
}

/// Produces a fresh session by logging in
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> Result<Session, TwitterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Restored,
    LoggedIn,
}

pub struct SessionResolver<A> {
    path: PathBuf,
    authenticator: A,
}

impl<A: Authenticator> SessionResolver<A> {
    pub fn new(path: impl Into<PathBuf>, authenticator: A) -> Self {
        Self {
            path: path.into(),
            authenticator,
        }
    }

    pub async fn resolve(&self) -> anyhow::Result<(Session, SessionOrigin)> {
        match Session::load(&self.path).await? {
            Some(session) if session.is_usable() => {
                log::info!("Restored session from {}", self.path.display());
                Ok((session, SessionOrigin::Restored))
            }
            Some(_) => {
                log::warn!(
                    "Session file {} is missing auth cookies, logging in again",
                    self.path.display()
                );
                Ok((self.login().await?, SessionOrigin::LoggedIn))
            }
            None => Ok((self.login().await?, SessionOrigin::LoggedIn)),
        }
    }

    /// Logs in and replaces the stored session
    pub async fn login(&self) -> anyhow::Result<Session> {
        let session = self.authenticator.login().await.context("Unable to log in")?;
        if !session.is_usable() {
            anyhow::bail!("Login did not yield auth cookies");
        }
        session.save(&self.path).await?;
        log::info!("Logged in, session saved to {}", self.path.display());
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn session(auth_token: &str) -> Session {
        Session::from_cookies([("auth_token", auth_token), ("ct0", "csrf"), ("guest_id", "v1")])
    }

    #[derive(Default)]
    pub(crate) struct FakeAuthenticator {
        pub logins: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn login(&self) -> Result<Session, TwitterError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(session(&format!("fresh-{n}")))
        }
    }

    #[test]
    fn parses_cookie_header() {
        let session = Session::from_cookie_header("ct0=abc; auth_token=def;guest_id=v1%3A1");
        assert_eq!(session.csrf_token(), Some("abc"));
        assert_eq!(session.get("auth_token"), Some("def"));
        assert_eq!(session.get("guest_id"), Some("v1%3A1"));
        assert!(session.is_usable());
        assert_eq!(
            session.cookie_header(),
            "auth_token=def; ct0=abc; guest_id=v1%3A1"
        );
    }

    #[test]
    fn stores_as_flat_object() {
        let json = serde_json::to_value(session("tok")).unwrap();
        assert_eq!(json["auth_token"], "tok");
        assert_eq!(json["ct0"], "csrf");
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        assert!(Session::load(&path).await.unwrap().is_none());
        session("tok").save(&path).await.unwrap();
        assert_eq!(Session::load(&path).await.unwrap(), Some(session("tok")));
    }

    #[tokio::test]
    async fn restores_existing_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        session("stored").save(&path).await.unwrap();
        let resolver = SessionResolver::new(&path, FakeAuthenticator::default());
        let (restored, origin) = resolver.resolve().await.unwrap();
        assert_eq!(origin, SessionOrigin::Restored);
        assert_eq!(restored.get("auth_token"), Some("stored"));
        assert_eq!(resolver.authenticator.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logs_in_and_persists_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let resolver = SessionResolver::new(&path, FakeAuthenticator::default());
        let (fresh, origin) = resolver.resolve().await.unwrap();
        assert_eq!(origin, SessionOrigin::LoggedIn);
        assert_eq!(Session::load(&path).await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn logs_in_when_stored_session_lacks_auth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        Session::from_cookies([("guest_id", "v1")])
            .save(&path)
            .await
            .unwrap();
        let resolver = SessionResolver::new(&path, FakeAuthenticator::default());
        let (_, origin) = resolver.resolve().await.unwrap();
        assert_eq!(origin, SessionOrigin::LoggedIn);
        assert_eq!(resolver.authenticator.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_session_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let resolver = SessionResolver::new(&path, FakeAuthenticator::default());
        assert!(resolver.resolve().await.is_err());
    }
}
