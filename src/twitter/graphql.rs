//! Timeline reads through the web client's GraphQL API, authenticated with a
//! restored or freshly created [`Session`].

use crate::model::Post;
use crate::twitter::session::Session;
use crate::twitter::{
    check_status, TwitterClient, TwitterError, TIMEOUT_SEC, USER_AGENT, WEB_BEARER_TOKEN,
};
use async_trait::async_trait;
use maplit::hashmap;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, COOKIE, USER_AGENT as USER_AGENT_HEADER,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const USER_TWEETS_URL: &str = "https://x.com/i/api/graphql/QWF3SzpHmykQHsQMixG0cg/UserTweets";

pub struct GraphQlClient {
    client: Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GraphQlResponse<T> {
    Ok {
        data: T,
    },
    // The API answers 200 with only `errors` for unknown users and the like
    #[allow(unused)]
    Error {
        errors: Value,
    },
}

#[derive(Deserialize)]
struct UserTweetsData {
    user: UserResults<TimelineUser>,
}

#[derive(Deserialize)]
struct UserResults<T> {
    result: T,
}

#[derive(Deserialize)]
struct TimelineUser {
    #[serde(alias = "timeline_v2")]
    timeline: TimelineHolder,
}

#[derive(Deserialize)]
struct TimelineHolder {
    timeline: Timeline,
}

#[derive(Deserialize)]
struct Timeline {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Instruction {
    TimelineAddEntries {
        entries: Vec<Entry>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "entryId")]
    entry_id: String,
    content: EntryContent,
}

#[derive(Deserialize)]
struct EntryContent {
    #[serde(rename = "itemContent")]
    item_content: Option<ItemContent>,
    // Modules such as self-threads carry their posts as items
    #[serde(default)]
    items: Vec<ModuleItem>,
}

#[derive(Deserialize)]
struct ModuleItem {
    item: ModuleItemContent,
}

#[derive(Deserialize)]
struct ModuleItemContent {
    #[serde(rename = "itemContent")]
    item_content: Option<ItemContent>,
}

impl Entry {
    /// The entry's post. A self-thread module yields the thread's first post,
    /// cursors and other modules yield nothing.
    fn into_result(self) -> Option<TweetResult> {
        let item_content = if self.entry_id.starts_with("tweet-") {
            self.content.item_content
        } else if self.entry_id.starts_with("profile-conversation-") {
            self.content.items.into_iter().next()?.item.item_content
        } else {
            None
        };
        item_content?.tweet_results?.result
    }
}

#[derive(Deserialize)]
struct ItemContent {
    tweet_results: Option<TweetResults>,
}

#[derive(Deserialize)]
struct TweetResults {
    result: Option<TweetResult>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum TweetResult {
    Tweet(RawTweet),
    TweetWithVisibilityResults {
        tweet: RawTweet,
    },
    #[serde(other)]
    Unavailable,
}

#[derive(Deserialize)]
struct RawTweet {
    rest_id: String,
    core: TweetCore,
    legacy: TweetLegacy,
    note_tweet: Option<NoteTweet>,
}

#[derive(Deserialize)]
struct TweetCore {
    user_results: UserResults<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    #[serde(default)]
    legacy: UserLegacy,
    avatar: Option<UserAvatar>,
}

#[derive(Deserialize, Default)]
struct UserLegacy {
    url: Option<String>,
    profile_image_url_https: Option<String>,
}

#[derive(Deserialize)]
struct UserAvatar {
    image_url: String,
}

#[derive(Deserialize)]
struct TweetLegacy {
    full_text: String,
    created_at: String,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    quote_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    bookmark_count: u64,
}

#[derive(Deserialize)]
struct NoteTweet {
    note_tweet_results: UserResults<NoteTweetText>,
}

#[derive(Deserialize)]
struct NoteTweetText {
    text: String,
}

impl From<RawTweet> for Post {
    fn from(tweet: RawTweet) -> Self {
        let user = tweet.core.user_results.result;
        let text = match tweet.note_tweet {
            Some(note) => note.note_tweet_results.result.text,
            None => tweet.legacy.full_text,
        };
        Post {
            text,
            time: tweet.legacy.created_at,
            profile_link: user.legacy.url,
            profile_image: user
                .legacy
                .profile_image_url_https
                .or_else(|| user.avatar.map(|a| a.image_url))
                .unwrap_or_default(),
            likes: tweet.legacy.favorite_count,
            retweets: tweet.legacy.retweet_count,
            quotes: tweet.legacy.quote_count,
            replies: tweet.legacy.reply_count,
            bookmark_count: tweet.legacy.bookmark_count,
            tweet_id: tweet.rest_id,
        }
    }
}

fn features() -> Value {
    json!({
        "rweb_tipjar_consumption_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "articles_preview_enabled": true,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "rweb_video_timestamps_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
    })
}

/// Extracts at most `count` posts from a `UserTweets` response body
fn parse_user_tweets(text: &str, count: usize) -> Result<Vec<Post>, TwitterError> {
    let response = serde_json::from_str::<GraphQlResponse<UserTweetsData>>(text)
        .map_err(|e| TwitterError::InvalidResponse(format!("{e}\nContents:\n{text}")))?;
    let data = match response {
        GraphQlResponse::Ok { data } => data,
        GraphQlResponse::Error { errors } => {
            return Err(TwitterError::InvalidResponse(errors.to_string()))
        }
    };
    let posts = data
        .user
        .result
        .timeline
        .timeline
        .instructions
        .into_iter()
        .flat_map(|instruction| match instruction {
            Instruction::TimelineAddEntries { entries } => entries,
            Instruction::Other => Vec::new(),
        })
        .filter_map(Entry::into_result)
        .filter_map(|result| match result {
            TweetResult::Tweet(tweet) => Some(tweet),
            TweetResult::TweetWithVisibilityResults { tweet } => Some(tweet),
            TweetResult::Unavailable => None,
        })
        .map(Post::from)
        .take(count)
        .collect();
    Ok(posts)
}

impl GraphQlClient {
    pub fn new(session: &Session) -> anyhow::Result<Self> {
        let csrf = session
            .csrf_token()
            .ok_or_else(|| anyhow::anyhow!("Session has no csrf token"))?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {WEB_BEARER_TOKEN}"))?;
        headers.insert(AUTHORIZATION, value);
        headers.insert(COOKIE, HeaderValue::from_str(&session.cookie_header())?);
        headers.insert("x-csrf-token", HeaderValue::from_str(csrf)?);
        headers.insert("x-twitter-auth-type", HeaderValue::from_static("OAuth2Session"));
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));
        headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
        Ok(Self {
            client: Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_secs(TIMEOUT_SEC))
                .build()?,
        })
    }
}

#[async_trait]
impl TwitterClient for GraphQlClient {
    async fn get_user_tweets(&self, user_id: u64, count: usize) -> Result<Vec<Post>, TwitterError> {
        let variables = json!({
            "userId": user_id.to_string(),
            "count": count,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": true,
            "withVoice": true,
            "withV2Timeline": true,
        });
        let query = hashmap! {
            "variables" => variables.to_string(),
            "features" => features().to_string(),
        };
        let response = self.client.get(USER_TWEETS_URL).query(&query).send().await?;
        let status = response.status();
        let text = response.text().await?;
        check_status(status, &text)?;
        parse_user_tweets(&text, count)
    }
}
