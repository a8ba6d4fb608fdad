use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::CONFIG;
use crate::relay::RelayHandle;

/// Body accepted by `POST /webhook`: an already-resolved single item, not
/// tied to the media-group model.
#[derive(Debug, Deserialize)]
pub struct WebhookCallbackPayload {
    pub file_url: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug)]
enum WebhookRejection {
    MalformedJson(serde_json::Error),
    MissingFileUrl,
}

#[derive(Clone)]
struct ServerState {
    relay: RelayHandle,
    submit_timeout: Duration,
}

fn parse_webhook_payload(body: &str) -> Result<(String, String), WebhookRejection> {
    let payload: WebhookCallbackPayload =
        serde_json::from_str(body).map_err(WebhookRejection::MalformedJson)?;
    let file_url = payload
        .file_url
        .filter(|value| !value.trim().is_empty())
        .ok_or(WebhookRejection::MissingFileUrl)?;
    let caption = payload.caption.unwrap_or_else(|| "no caption".to_string());
    Ok((file_url, caption))
}

async fn ping() -> &'static str {
    "Pong! Online"
}

async fn webhook(State(state): State<ServerState>, body: String) -> StatusCode {
    let (file_url, caption) = match parse_webhook_payload(&body) {
        Ok(parts) => parts,
        Err(WebhookRejection::MissingFileUrl) => return StatusCode::BAD_REQUEST,
        Err(WebhookRejection::MalformedJson(err)) => {
            error!("malformed webhook payload: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match state
        .relay
        .submit_webhook_send(file_url, caption, state.submit_timeout)
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            error!("webhook send failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn router(relay: RelayHandle, submit_timeout: Duration) -> Router {
    // callers only know /ping and /webhook exist; a wrong method on either
    // gets the same 404 as an unknown path
    Router::new()
        .route("/ping", get(ping))
        .route("/webhook", post(webhook))
        .method_not_allowed_fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(ServerState {
            relay,
            submit_timeout,
        })
}

/// Runs the webhook ingest server until the process exits. Requests are
/// handled concurrently; the only path back into bot state is the relay
/// handle's submit-and-await handoff.
pub async fn serve(relay: RelayHandle) -> anyhow::Result<()> {
    let app = router(relay, CONFIG.relay_submit_timeout());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", CONFIG.port)).await?;
    info!("Webhook ingest server listening on port {}", CONFIG.port);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{self, RelayJob};

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_router(relay: RelayHandle) -> Router {
        router(relay, Duration::from_secs(1))
    }

    fn post_webhook(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn ping_replies_with_the_liveness_banner() {
        let (relay, _jobs) = relay::channel(1);
        let response = test_router(relay)
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(&body[..], b"Pong! Online");
    }

    #[tokio::test]
    async fn valid_payload_schedules_exactly_one_send() {
        let (relay, mut jobs) = relay::channel(1);
        let consumer = tokio::spawn(async move {
            match jobs.recv().await {
                Some(RelayJob::WebhookSend {
                    file_url,
                    caption,
                    reply,
                }) => {
                    let _ = reply.send(Ok(()));
                    Some((file_url, caption))
                }
                _ => None,
            }
        });

        let response = test_router(relay)
            .oneshot(post_webhook(r#"{"file_url": "https://x/y.jpg"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let (file_url, caption) = consumer.await.expect("consumer").expect("one job");
        assert_eq!(file_url, "https://x/y.jpg");
        assert_eq!(caption, "no caption");
    }

    #[tokio::test]
    async fn missing_file_url_is_rejected_without_scheduling() {
        let (relay, mut jobs) = relay::channel(1);

        let response = test_router(relay)
            .oneshot(post_webhook("{}"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(jobs.try_recv().is_err(), "nothing was scheduled");
    }

    #[tokio::test]
    async fn malformed_json_is_a_server_error() {
        let (relay, _jobs) = relay::channel(1);

        let response = test_router(relay)
            .oneshot(post_webhook("not json at all"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn relay_failure_surfaces_as_a_server_error() {
        let (relay, mut jobs) = relay::channel(1);
        tokio::spawn(async move {
            if let Some(RelayJob::WebhookSend { reply, .. }) = jobs.recv().await {
                let _ = reply.send(Err(crate::processor::ProcessError::InvalidFileUrl(
                    url::Url::parse("not a url").unwrap_err(),
                )));
            }
        });

        let response = test_router(relay)
            .oneshot(post_webhook(r#"{"file_url": "not a url"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_paths_and_methods_are_not_found() {
        let (relay, _jobs) = relay::channel(1);
        let app = test_router(relay);

        let requests = [
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .expect("request"),
            Request::builder()
                .method("GET")
                .uri("/webhook")
                .body(Body::empty())
                .expect("request"),
            Request::builder()
                .method("POST")
                .uri("/ping")
                .body(Body::empty())
                .expect("request"),
        ];
        for request in requests {
            let response = app.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
