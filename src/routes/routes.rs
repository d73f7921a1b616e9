//! Defines every route the site serves.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `GET  /albums`                  -> album names
//!   - `GET  /albums/{album}`          -> photo URLs in one album
//!   - `GET  /objects/{bucket}/{*key}` -> download (signature required outside the photo bucket)
//!   - `PUT  /objects/{bucket}/{*key}` -> upload with a signed PUT URL
//!
//! - **Private endpoints** (bearer token required)
//!   - `GET  /files?prefix=`           -> folders and files
//!   - `GET  /files/{*key}`            -> signed download URL
//!   - `POST /files`                   -> signed upload URL
//!
//! The wildcard `*key` allows nested keys like `music/2006/track.mp3`.

use crate::{
    handlers::{
        album_handlers::{list_album_photos, list_albums},
        file_handlers::{create_upload_url, get_file_url, list_files},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, put_object},
    },
    middleware::auth::require_principal,
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    middleware::from_fn_with_state,
    routing::get,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the full application router with its state applied.
pub fn routes(state: AppState) -> Router {
    let public = Router::new()
        .route("/albums", get(list_albums))
        .route("/albums/{album}", get(list_album_photos))
        .route("/objects/{bucket}/{*key}", get(get_object).put(put_object));

    let private = Router::new()
        .route("/files", get(list_files).post(create_upload_url))
        .route("/files/{*key}", get(get_file_url))
        .route_layer(from_fn_with_state(state.clone(), require_principal))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Authorization,Content-Type"),
        ));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(public)
        .merge(private);

    with_site_layers(app).with_state(state)
}

/// Layers shared by every route: request ceiling, `Access-Control-Allow-Origin: *`,
/// CORS preflight and request tracing.
fn with_site_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::{REQUEST_TIMEOUT, routes, with_site_layers};
    use crate::test_support::{PHOTO_BUCKET, PRIVATE_BUCKET, bearer, put_object, test_state};
    use axum::{
        body::Body,
        http::{HeaderMap, Method, Request, StatusCode, header},
    };
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn authed_get(uri: &str, auth: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    fn json_of(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    /// Path and query of an issued URL, ready to send to the router.
    fn target_of(url: &str) -> String {
        let url = Url::parse(url).unwrap();
        format!("{}?{}", url.path(), url.query().unwrap_or_default())
    }

    #[tokio::test]
    async fn albums_are_discovered_and_listed() {
        let (state, _dir) = test_state().await;
        for key in [
            "images/",
            "images/beach/",
            "images/beach/1.jpg",
            "images/camping/",
            "images/camping/a.jpg",
            "images/camping/b.jpg",
            "images/camping/nested/c.jpg",
        ] {
            put_object(&state.storage, PHOTO_BUCKET, key, b"jpg").await;
        }

        let (status, headers, body) = send(routes(state.clone()), get("/albums")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(json_of(&body), json!(["beach", "camping"]));

        let (status, _, body) = send(routes(state), get("/albums/camping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_of(&body),
            json!([
                "http://localhost:3000/objects/photos/images/camping/a.jpg",
                "http://localhost:3000/objects/photos/images/camping/b.jpg",
            ])
        );
    }

    #[tokio::test]
    async fn empty_photo_bucket_has_no_albums() {
        let (state, _dir) = test_state().await;

        let (status, _, body) = send(routes(state.clone()), get("/albums")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!([]));

        let (status, _, body) = send(routes(state), get("/albums/nowhere")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!([]));
    }

    #[tokio::test]
    async fn private_routes_require_a_token() {
        let (state, _dir) = test_state().await;

        let (status, headers, body) = send(routes(state.clone()), get("/files")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(json_of(&body)["error"].is_string());

        let (status, _, _) = send(
            routes(state.clone()),
            authed_get("/files", "Bearer not-a-token"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(routes(state), get("/files/docs/a.txt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn files_lists_folders_and_files() {
        let (state, _dir) = test_state().await;
        for key in ["docs/", "docs/a.txt", "docs/sub/b.txt", "top.txt"] {
            put_object(&state.storage, PRIVATE_BUCKET, key, b"hello").await;
        }
        let auth = bearer(&state, "friend");

        let (status, headers, body) =
            send(routes(state.clone()), authed_get("/files?prefix=docs/", &auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Authorization,Content-Type"
        );

        let listing = json_of(&body);
        assert_eq!(
            listing["folders"],
            json!([{ "key": "docs/sub/", "type": "folder" }])
        );
        let files = listing["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["key"], "docs/a.txt");
        assert_eq!(files[0]["size"], 5);
        assert_eq!(files[0]["type"], "file");
        assert!(files[0]["lastModified"].is_string());

        let (_, _, body) = send(routes(state), authed_get("/files", &auth)).await;
        let root = json_of(&body);
        assert_eq!(root["folders"], json!([{ "key": "docs/", "type": "folder" }]));
        assert_eq!(root["files"][0]["key"], "top.txt");
    }

    #[tokio::test]
    async fn upload_url_requires_a_key() {
        let (state, _dir) = test_state().await;
        let auth = bearer(&state, "friend");

        for body in ["", "{}", r#"{"key":""}"#, "not json"] {
            let request = Request::post("/files")
                .header(header::AUTHORIZATION, &auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            let (status, _, _) = send(routes(state.clone()), request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        }
    }

    #[tokio::test]
    async fn signed_upload_then_signed_download() {
        let (state, _dir) = test_state().await;
        let auth = bearer(&state, "friend");

        let request = Request::post("/files")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::from(
                r#"{"key":"music/Track 01.mp3","contentType":"audio/mpeg"}"#,
            ))
            .unwrap();
        let (status, _, body) = send(routes(state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        let upload_url = json_of(&body)["url"].as_str().unwrap().to_string();
        assert!(upload_url.contains("/objects/private-files/music/Track%2001.mp3?"));

        let put = Request::put(target_of(&upload_url))
            .header(header::CONTENT_TYPE, "audio/mpeg")
            .body(Body::from("tune"))
            .unwrap();
        let (status, headers, _) = send(routes(state.clone()), put).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(header::ETAG));

        let (status, _, body) = send(
            routes(state.clone()),
            authed_get("/files/music/Track%2001.mp3", &auth),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let download_url = json_of(&body)["url"].as_str().unwrap().to_string();

        let (status, headers, body) = send(routes(state), get(&target_of(&download_url))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(&body[..], b"tune");
    }

    #[tokio::test]
    async fn signatures_bind_method_and_content_type() {
        let (state, _dir) = test_state().await;
        put_object(&state.storage, PRIVATE_BUCKET, "docs/a.txt", b"hello").await;

        let download = state
            .signer
            .issue_download_url(PRIVATE_BUCKET, "docs/a.txt")
            .unwrap();
        let put = Request::put(target_of(download.as_str()))
            .body(Body::from("overwrite"))
            .unwrap();
        let (status, _, _) = send(routes(state.clone()), put).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let upload = state
            .signer
            .issue_upload_url(PRIVATE_BUCKET, "docs/b.txt", Some("text/plain"))
            .unwrap();
        let put = Request::put(target_of(upload.as_str()))
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from("png"))
            .unwrap();
        let (status, _, _) = send(routes(state.clone()), put).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(routes(state), get(&target_of(upload.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn only_the_photo_bucket_is_readable_unsigned() {
        let (state, _dir) = test_state().await;
        put_object(&state.storage, PHOTO_BUCKET, "images/beach/1.jpg", b"jpg").await;
        put_object(&state.storage, PRIVATE_BUCKET, "docs/a.txt", b"hello").await;

        let (status, _, body) = send(
            routes(state.clone()),
            get("/objects/photos/images/beach/1.jpg"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"jpg");

        let (status, _, _) = send(
            routes(state.clone()),
            get("/objects/private-files/docs/a.txt"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(routes(state), get("/objects/photos/images/none.jpg")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preflight_is_answered_without_a_token() {
        let (state, _dir) = test_state().await;

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/files")
            .header(header::ORIGIN, "https://photos.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(routes(state), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn health_probes_report_ok() {
        let (state, _dir) = test_state().await;

        let (status, _, body) = send(routes(state.clone()), get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["status"], "ok");

        let (status, _, body) = send(routes(state), get("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["checks"]["sqlite"]["ok"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_requests_hit_the_ceiling() {
        let slow = axum::Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(REQUEST_TIMEOUT + Duration::from_secs(1)).await;
                "late"
            }),
        );

        let (status, headers, _) = send(with_site_layers(slow), get("/slow")).await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn keys_that_cannot_be_stored_get_no_url() {
        let (state, _dir) = test_state().await;
        let auth = bearer(&state, "friend");

        for key in ["a/./b.txt", "a/b/.", "a//b", "a\\b"] {
            let body = json!({ "key": key }).to_string();
            let request = Request::post("/files")
                .header(header::AUTHORIZATION, &auth)
                .body(Body::from(body))
                .unwrap();
            let (status, _, _) = send(routes(state.clone()), request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "upload {key:?}");
        }

        for path in ["/files/a/./b.txt", "/files/a%5Cb"] {
            let (status, _, _) = send(routes(state.clone()), authed_get(path, &auth)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "download {path:?}");
        }
    }

    #[tokio::test]
    async fn album_links_encode_key_segments() {
        let (state, _dir) = test_state().await;
        put_object(&state.storage, PHOTO_BUCKET, "images/beach/sun #1.jpg", b"jpg").await;

        let (status, _, body) = send(routes(state.clone()), get("/albums/beach")).await;
        assert_eq!(status, StatusCode::OK);
        let links = json_of(&body);
        assert_eq!(
            links,
            json!(["http://localhost:3000/objects/photos/images/beach/sun%20%231.jpg"])
        );

        let (status, _, body) = send(
            routes(state),
            get(&target_of(links[0].as_str().unwrap())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"jpg");
    }
}
