mod error;

use crate::config::ServeArgs;
use crate::model::Post;
use crate::store::{PostStore, RedisStore};
use actix_web::http::StatusCode;
use actix_web::web::{self, Data, ServiceConfig};
use actix_web::{App, HttpResponse, HttpServer};
use anyhow::Context;
use error::{HttpError, IntoHttpError};
use std::sync::Arc;

/// The latest published batch, or an empty list when there is none
async fn tweets(store: Data<dyn PostStore>) -> Result<HttpResponse, HttpError> {
    let latest = store
        .latest()
        .await
        .context("Unable to read tweets")
        .map_500()?;
    let posts = match latest {
        Some(payload) => serde_json::from_str::<Vec<Post>>(&payload).unwrap_or_else(|e| {
            log::error!("Stored tweets are not a valid batch: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };
    Ok(HttpResponse::build(StatusCode::OK).json(posts))
}

async fn method_not_allowed() -> Result<HttpResponse, HttpError> {
    Err(HttpError::new(StatusCode::METHOD_NOT_ALLOWED))
}

fn configure(cfg: &mut ServiceConfig, store: Data<dyn PostStore>) {
    cfg.app_data(store);
    cfg.service(
        web::resource("/tweets")
            .route(web::get().to(tweets))
            .default_service(web::to(method_not_allowed)),
    );
}

pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    args.validate().context("Invalid configuration")?;
    let store = RedisStore::connect(&args.redis_url, &args.redis_key)
        .await
        .context("Unable to connect to Redis")?;
    let store: Data<dyn PostStore> = Data::from(Arc::new(store) as Arc<dyn PostStore>);
    let server = HttpServer::new(move || App::new().configure(|s| configure(s, store.clone())))
        .bind(args.socket)?
        .run();
    log::info!("Serving tweets on http://{}/tweets", args.socket);
    server.await.context("Unable to run HTTP server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_post;
    use crate::store::tests::MemoryStore;
    use crate::store::StoreError;
    use actix_web::test;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl PostStore for BrokenStore {
        async fn replace_latest(&self, _payload: String) -> Result<(), StoreError> {
            Ok(())
        }

        async fn latest(&self) -> Result<Option<String>, StoreError> {
            Err(StoreError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }
    }

    async fn call(store: Arc<dyn PostStore>, request: test::TestRequest) -> (StatusCode, Vec<u8>) {
        let data: Data<dyn PostStore> = Data::from(store);
        let app = test::init_service(App::new().configure(|s| configure(s, data))).await;
        let response = test::call_service(&app, request.uri("/tweets").to_request()).await;
        let status = response.status();
        (status, test::read_body(response).await.to_vec())
    }

    async fn get(store: Arc<dyn PostStore>) -> (StatusCode, Vec<u8>) {
        call(store, test::TestRequest::get()).await
    }

    #[actix_web::test]
    async fn returns_latest_batch() {
        let store = MemoryStore::default();
        let posts = vec![sample_post("1", "a"), sample_post("2", "b")];
        store
            .list
            .lock()
            .unwrap()
            .push_front(serde_json::to_string(&posts).unwrap());
        let (status, body) = get(Arc::new(store)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Vec<Post>>(&body).unwrap(), posts);
    }

    #[actix_web::test]
    async fn empty_store_returns_empty_list() {
        let (status, body) = get(Arc::new(MemoryStore::default())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[actix_web::test]
    async fn corrupt_batch_returns_empty_list() {
        let store = MemoryStore::default();
        store.list.lock().unwrap().push_front("{not json".to_string());
        let (status, body) = get(Arc::new(store)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[actix_web::test]
    async fn store_failure_is_500() {
        let (status, body) = get(Arc::new(BrokenStore)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({ "message": "Internal server error" })
        );
    }

    #[actix_web::test]
    async fn other_methods_are_not_allowed() {
        let (status, body) = call(Arc::new(MemoryStore::default()), test::TestRequest::post()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({ "message": "Method not allowed" })
        );
    }
}
