use askama::Template;
use axum::{
    extract::{Multipart, State},
    extract::multipart::MultipartError,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Form,
};
use axum::http::header::CONTENT_SECURITY_POLICY;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::auth::SharedGate;
use crate::constants;
use crate::mime;
use crate::models::GalleryImage;
use crate::store::{ImageStore, StoreError};
use crate::templates::{GalleryTemplate, LoginTemplate};

#[derive(Clone)]
pub struct AppState {
    pub store: ImageStore,
    pub gate: SharedGate,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    filename: String,
}

/// 302 back to the gallery, optionally setting a cookie on the way
pub fn redirect_home(set_cookie: Option<String>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response();

    if let Some(cookie) = set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(_) => tracing::error!("Session cookie is not a valid header value"),
        }
    }

    response
}

/// Handler for the root path - gallery when signed in, login form otherwise
pub async fn index_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    if state.gate.is_authenticated(&headers) {
        render_gallery(&state.store, Vec::new()).await
    } else {
        render_login(None)
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match state.gate.login(&form.password) {
        Some(cookie) => {
            tracing::info!("Login succeeded");
            Ok(redirect_home(Some(cookie)))
        }
        None => {
            tracing::warn!("Login failed: incorrect password");
            Ok(render_login(Some("Incorrect password".to_string()))?.into_response())
        }
    }
}

pub async fn logout_handler(State(state): State<AppState>) -> Response {
    redirect_home(Some(state.gate.logout_cookie()))
}

/// Store every `file` part of the form. Any rejection re-renders the gallery
/// with the messages; a clean upload redirects.
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut errors = Vec::new();
    let mut saw_file = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                errors.push(multipart_message(&err));
                break;
            }
        };

        if field.name() != Some("file") {
            continue;
        }
        saw_file = true;

        let filename = field.file_name().unwrap_or_default().to_string();
        let content = match field.bytes().await {
            Ok(content) => content,
            Err(err) => {
                errors.push(multipart_message(&err));
                break;
            }
        };

        if let Err(err) = state.store.write(&filename, &content).await {
            if let StoreError::Io(io_err) = &err {
                tracing::error!(filename = %filename, error = %io_err, "Failed to write upload");
            }
            errors.push(if filename.is_empty() {
                err.to_string()
            } else {
                format!("{filename}: {err}")
            });
        }
    }

    if !saw_file {
        errors.push(StoreError::MissingFile.to_string());
    }

    if errors.is_empty() {
        Ok(redirect_home(None))
    } else {
        Ok(render_gallery(&state.store, errors).await?.into_response())
    }
}

fn multipart_message(err: &MultipartError) -> String {
    tracing::warn!(error = %err, "Malformed upload");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StoreError::TooLarge.to_string()
    } else {
        "Upload failed".to_string()
    }
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Form(form): Form<DeleteForm>,
) -> Response {
    state.store.delete(&form.filename).await;
    redirect_home(None)
}

/// Any other GET is a file request under the storage root
pub async fn serve_file_handler(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, AppError> {
    let decoded_path = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| AppError::NotFound)?;

    let file = state.store.open(&decoded_path).await.map_err(|err| {
        if let StoreError::Io(io_err) = &err {
            tracing::error!(path = %decoded_path, error = %io_err, "Failed to read file");
        }
        AppError::from(err)
    })?;

    let content_type = mime::for_path(&file.path);
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, constants::IMAGE_CACHE_CONTROL),
        ],
        file.contents,
    )
        .into_response();

    // SVG can carry script; serve it sandboxed
    if content_type == "image/svg+xml" {
        response.headers_mut().insert(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; sandbox"),
        );
    }

    Ok(response)
}

async fn render_gallery(store: &ImageStore, errors: Vec<String>) -> Result<Html<String>, AppError> {
    let images = store.list().await.into_iter().map(GalleryImage::new).collect();

    let template = GalleryTemplate {
        images,
        errors,
        app_name: constants::APP_NAME,
        emoji_prefix: constants::EMOJI_PREFIX,
    };
    Ok(Html(template.render().map_err(|_| AppError::Internal)?))
}

fn render_login(error: Option<String>) -> Result<Html<String>, AppError> {
    let template = LoginTemplate {
        error,
        app_name: constants::APP_NAME,
        emoji_prefix: constants::EMOJI_PREFIX,
    };
    Ok(Html(template.render().map_err(|_| AppError::Internal)?))
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    NotFound,
    Internal,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound | StoreError::InvalidName => AppError::NotFound,
            _ => AppError::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Server Error"),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::Request, Router};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::auth::SharedSecretGate;

    const SECRET: &str = "test-secret";
    const BOUNDARY: &str = "snapshelf-test-boundary";

    fn make_app() -> (TempDir, ImageStore, Router) {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("images");
        std::fs::create_dir_all(&root).unwrap();
        let store = ImageStore::new(root.canonicalize().unwrap(), 1024);
        let state = AppState {
            store: store.clone(),
            gate: Arc::new(SharedSecretGate::new(SECRET)),
        };
        (temp, store, crate::build_app(state, false))
    }

    fn session_cookie() -> String {
        format!("token={SECRET}")
    }

    fn form_request(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn upload_request(files: &[(&str, &[u8])], cookie: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        for (filename, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn anonymous_root_shows_login_form() {
        let (_temp, _store, app) = make_app();

        let response = app.oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));

        let body = body_text(response).await;
        assert!(body.contains("name=\"password\""));
        assert!(!body.contains("action=\"/upload\""));
    }

    #[tokio::test]
    async fn correct_password_sets_cookie_and_redirects() {
        let (_temp, _store, app) = make_app();

        let response = app
            .oneshot(form_request("/login", "password=test-secret", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert_eq!(
            response.headers()[header::SET_COOKIE],
            "token=test-secret; Path=/; HttpOnly; SameSite=Strict; Max-Age=86400"
        );
    }

    #[tokio::test]
    async fn wrong_password_rerenders_login_with_error() {
        let (_temp, _store, app) = make_app();

        let response = app
            .oneshot(form_request("/login", "password=nope", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(response).await.contains("Incorrect password"));
    }

    #[tokio::test]
    async fn missing_password_field_counts_as_wrong() {
        let (_temp, _store, app) = make_app();

        let response = app.oneshot(form_request("/login", "", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn uploaded_image_is_listed_and_served() {
        let (_temp, store, app) = make_app();
        let cookie = session_cookie();

        let response = app
            .clone()
            .oneshot(upload_request(&[("photo.png", b"\x89PNG\r\n")], Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert_eq!(store.list().await, vec!["photo.png".to_string()]);

        let response = app
            .clone()
            .oneshot(get_request("/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("photo.png"));

        let response = app.oneshot(get_request("/photo.png", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG\r\n");
    }

    #[tokio::test]
    async fn disallowed_type_is_rejected_inline() {
        let (_temp, store, app) = make_app();

        let response = app
            .oneshot(upload_request(&[("evil.exe", b"MZ")], Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("File type not allowed"));
        assert!(store.list().await.is_empty());
        assert!(!store.root().join("evil.exe").exists());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_inline() {
        let (_temp, store, app) = make_app();

        let response = app
            .oneshot(upload_request(&[("big.png", &[7u8; 4096])], Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("File too large"));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected_inline() {
        let (_temp, _store, app) = make_app();

        let response = app
            .oneshot(upload_request(&[], Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("No file selected"));
    }

    #[tokio::test]
    async fn mixed_upload_keeps_good_files() {
        let (_temp, store, app) = make_app();

        let response = app
            .oneshot(upload_request(
                &[("good.gif", b"GIF89a"), ("bad.txt", b"text")],
                Some(&session_cookie()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("bad.txt: File type not allowed"));
        assert_eq!(store.list().await, vec!["good.gif".to_string()]);
    }

    #[tokio::test]
    async fn anonymous_upload_redirects_without_writing() {
        let (_temp, store, app) = make_app();

        let response = app
            .oneshot(upload_request(&[("photo.png", b"png")], None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn anonymous_delete_redirects_without_deleting() {
        let (_temp, store, app) = make_app();
        std::fs::write(store.root().join("keep.png"), b"png").unwrap();

        let response = app
            .oneshot(form_request("/delete", "filename=keep.png", Some("token=wrong")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(store.root().join("keep.png").is_file());
    }

    #[tokio::test]
    async fn delete_removes_file_and_redirects() {
        let (_temp, store, app) = make_app();
        std::fs::write(store.root().join("old.jpg"), b"jpg").unwrap();

        let response = app
            .oneshot(form_request("/delete", "filename=old.jpg", Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(!store.root().join("old.jpg").exists());
    }

    #[tokio::test]
    async fn deleting_missing_file_still_redirects() {
        let (_temp, _store, app) = make_app();

        let response = app
            .oneshot(form_request("/delete", "filename=ghost.png", Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn traversal_delete_touches_nothing_outside_root() {
        let (temp, _store, app) = make_app();
        let outside = temp.path().join("passwd.png");
        std::fs::write(&outside, b"keep").unwrap();

        for target in ["../../etc/passwd", "../passwd.png", "..%5Cpasswd.png"] {
            let response = app
                .clone()
                .oneshot(form_request(
                    "/delete",
                    &format!("filename={target}"),
                    Some(&session_cookie()),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FOUND);
        }

        assert!(outside.is_file());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_temp, _store, app) = make_app();

        let response = app.oneshot(get_request("/nope.png", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn encoded_traversal_cannot_read_outside_root() {
        let (temp, _store, app) = make_app();
        std::fs::write(temp.path().join("secret.png"), b"secret").unwrap();

        for uri in ["/%2e%2e/secret.png", "/..%2fsecret.png", "/..%5csecret.png"] {
            let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn nul_in_path_is_not_found() {
        let (_temp, _store, app) = make_app();

        let response = app.oneshot(get_request("/a%00.png", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn get_on_form_endpoints_is_a_file_request() {
        let (_temp, store, app) = make_app();

        for uri in ["/upload", "/delete", "/login", "/logout"] {
            let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body_text(response).await, "Not Found");
        }

        // A stored file by that name is served like any other
        std::fs::write(store.root().join("upload"), b"raw").unwrap();
        let response = app
            .oneshot(get_request("/upload", Some(&session_cookie())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn unknown_extension_served_as_octet_stream() {
        let (_temp, store, app) = make_app();
        std::fs::write(store.root().join("notes.txt"), b"hi").unwrap();

        let response = app.oneshot(get_request("/notes.txt", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn svg_is_served_sandboxed() {
        let (_temp, store, app) = make_app();
        std::fs::write(store.root().join("logo.svg"), b"<svg/>").unwrap();

        let response = app.oneshot(get_request("/logo.svg", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert!(response.headers()[CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .contains("sandbox"));
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let (_temp, _store, app) = make_app();

        let response = app
            .oneshot(form_request("/logout", "", Some(&session_cookie())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let (_temp, _store, app) = make_app();

        let response = app.oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert!(response.headers().get("strict-transport-security").is_none());
    }
}
