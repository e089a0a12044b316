use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Format of the `created_at` field on the platform's legacy objects
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub text: String,
    /// Creation time as reported by the platform, kept verbatim
    pub time: String,
    pub profile_link: Option<String>,
    pub profile_image: String,
    pub likes: u64,
    pub retweets: u64,
    pub quotes: u64,
    pub replies: u64,
    pub bookmark_count: u64,
    pub tweet_id: String,
}

impl Post {
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.time, CREATED_AT_FORMAT).ok()
    }
}

/// The newest creation time in a batch, ignoring unparseable timestamps
pub fn newest(posts: &[Post]) -> Option<DateTime<FixedOffset>> {
    posts.iter().filter_map(Post::created_at).max()
}

#[cfg(test)]
pub(crate) fn sample_post(id: &str, text: &str) -> Post {
    Post {
        text: text.to_string(),
        time: "Wed Oct 10 20:19:24 +0000 2018".to_string(),
        profile_link: Some("https://t.co/profile".to_string()),
        profile_image: "https://pbs.twimg.com/profile_images/1/avatar_normal.jpg".to_string(),
        likes: 12,
        retweets: 3,
        quotes: 1,
        replies: 4,
        bookmark_count: 2,
        tweet_id: id.to_string(),
    }
}
