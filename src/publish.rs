use crate::config::PublishArgs;
use crate::model::{self, Post};
use crate::store::{PostStore, RedisStore};
use crate::twitter::graphql::GraphQlClient;
use crate::twitter::login::LoginFlow;
use crate::twitter::session::{Authenticator, Session, SessionOrigin, SessionResolver};
use crate::twitter::TwitterClient;
use crate::unshorten::{unshorten_links, RedirectUnshortener, Unshortener};
use anyhow::Context;
use std::time::Duration;

pub async fn publish(args: PublishArgs) -> anyhow::Result<()> {
    args.validate().context("Invalid configuration")?;
    let sessions = SessionResolver::new(&args.cookies, LoginFlow::new(args.credentials())?);
    let posts = fetch_posts(&sessions, connect, args.user_id, args.count).await?;
    log::info!("Fetched {} posts for user {}", posts.len(), args.user_id);

    let unshortener = RedirectUnshortener::new(Duration::from_secs(args.resolve_timeout))?;
    let posts = unshorten_posts(posts, &unshortener).await;

    let store = RedisStore::connect(&args.redis_url, &args.redis_key)
        .await
        .context("Unable to connect to Redis")?;
    publish_batch(&store, &posts).await
}

fn connect(session: &Session) -> anyhow::Result<Box<dyn TwitterClient>> {
    Ok(Box::new(GraphQlClient::new(session)?))
}

/// Fetches with the stored session, logging in again once if the platform
/// rejects it
pub async fn fetch_posts<A, F>(
    sessions: &SessionResolver<A>,
    connect: F,
    user_id: u64,
    count: usize,
) -> anyhow::Result<Vec<Post>>
where
    A: Authenticator,
    F: Fn(&Session) -> anyhow::Result<Box<dyn TwitterClient>>,
{
    let (session, origin) = sessions.resolve().await?;
    let client = connect(&session)?;
    match client.get_user_tweets(user_id, count).await {
        Ok(posts) => Ok(posts),
        Err(e) if e.is_unauthorized() && origin == SessionOrigin::Restored => {
            log::warn!("Stored session expired ({}), logging in again", e);
            let session = sessions.login().await?;
            let client = connect(&session)?;
            client
                .get_user_tweets(user_id, count)
                .await
                .context("Unable to fetch tweets")
        }
        Err(e) => Err(e).context("Unable to fetch tweets"),
    }
}

pub async fn unshorten_posts(posts: Vec<Post>, unshortener: &dyn Unshortener) -> Vec<Post> {
    let mut rewritten = Vec::with_capacity(posts.len());
    for mut post in posts {
        post.text = unshorten_links(&post.text, unshortener).await;
        rewritten.push(post);
    }
    rewritten
}

pub async fn publish_batch(store: &dyn PostStore, posts: &[Post]) -> anyhow::Result<()> {
    let payload = serde_json::to_string(posts).context("Unable to serialize posts")?;
    store
        .replace_latest(payload)
        .await
        .context("Unable to publish posts")?;
    match model::newest(posts) {
        Some(newest) => log::info!("Published {} posts, newest from {}", posts.len(), newest),
        None => log::info!("Published {} posts", posts.len()),
    }
    Ok(())
}
