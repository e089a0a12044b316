//! Rewrites `t.co` links in post text to the destination they redirect to.
//!
//! Every link is resolved independently: a link that cannot be resolved is
//! left in place and the rest of the text is still rewritten.

use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SEC: u64 = 5;
const MAX_REDIRECTS: usize = 30;

static SHORT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://t\.co/[a-zA-Z0-9]+").expect("valid short link regex"));

/// Outcome of resolving a single shortened link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Error performing HTTP request: {0}")]
    RequestError(
        #[source]
        #[from]
        reqwest::Error,
    ),
}

#[async_trait]
pub trait Unshortener: Send + Sync {
    async fn resolve(&self, link: &str) -> Resolution;
}

/// Follows the redirect chain of a link with bodiless `HEAD` requests
pub struct RedirectUnshortener {
    client: Client,
    timeout: Duration,
}

impl RedirectUnshortener {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .redirect(Policy::limited(MAX_REDIRECTS))
                .timeout(timeout)
                .build()?,
            timeout,
        })
    }

    async fn final_url(&self, link: &str) -> Result<String, ResolveError> {
        let response = self.client.head(link).send().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::Timeout(self.timeout)
            } else {
                ResolveError::RequestError(e)
            }
        })?;
        Ok(response.url().to_string())
    }
}

#[async_trait]
impl Unshortener for RedirectUnshortener {
    async fn resolve(&self, link: &str) -> Resolution {
        match self.final_url(link).await {
            Ok(url) if url != link => {
                log::debug!("Resolved {} to {}", link, url);
                Resolution::Resolved(url)
            }
            Ok(_) => Resolution::Unresolved(link.to_string()),
            Err(e) => {
                log::warn!("Error unshortening {}: {}", link, e);
                Resolution::Unresolved(link.to_string())
            }
        }
    }
}

/// Shortened links in order of first appearance, without duplicates
pub fn find_links(text: &str) -> Vec<&str> {
    let mut links: Vec<&str> = Vec::new();
    for m in SHORT_LINK.find_iter(text) {
        if !links.contains(&m.as_str()) {
            links.push(m.as_str());
        }
    }
    links
}

pub async fn unshorten_links(text: &str, unshortener: &dyn Unshortener) -> String {
    let mut resolutions = Vec::new();
    for link in find_links(text) {
        resolutions.push((link, unshortener.resolve(link).await));
    }
    apply(text, &resolutions)
}

/// Rewrites each matched link as a whole token, so a link that is a prefix of
/// another never touches the longer one.
fn apply(text: &str, resolutions: &[(&str, Resolution)]) -> String {
    let targets: HashMap<&str, &str> = resolutions
        .iter()
        .filter_map(|(link, resolution)| match resolution {
            Resolution::Resolved(url) if url != link => Some((*link, url.as_str())),
            _ => None,
        })
        .collect();
    if targets.is_empty() {
        return text.to_string();
    }
    SHORT_LINK
        .replace_all(text, |caps: &Captures| {
            let link = &caps[0];
            targets.get(link).copied().unwrap_or(link).to_string()
        })
        .into_owned()
}
