use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ServerConfig};
use crate::endpoints::{annotation, assignment, submission};
use crate::state::AppState;

mod assignment_code;
mod config;
mod database;
mod endpoints;
mod error;
mod google;
mod model;
mod security;
mod state;
mod storage;

/// Headroom above the largest accepted PDF for the other multipart fields
const BODY_OVERHEAD: usize = 1024 * 1024;

#[tokio::main]
async fn main() {
    let config = Config::load();

    // Begin logging. RUST_LOG wins over the configured level.
    let log_level = config
        .as_ref()
        .map(|c| c.server.log_level.clone())
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };

    // Initialize the database, aborting start-up if an error occurs
    let pool = match database::init_database(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };

    info!("Database initialized");

    let addr = match format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid listen address: {e}");
            return;
        }
    };
    let tls = config.server.tls_cert.clone().zip(config.server.tls_key.clone());

    let app = build_router(AppState::new(pool, config));

    let served = match tls {
        Some((cert, key)) => {
            if rustls::crypto::aws_lc_rs::default_provider()
                .install_default()
                .is_err()
            {
                tracing::warn!("A rustls crypto provider was already installed");
            }

            // Load the certificate for HTTPS
            let tls_config = match RustlsConfig::from_pem_file(&cert, &key).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Could not load TLS certificate {cert}: {e}");
                    return;
                }
            };

            info!("Listening on https://{addr}");
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!("Listening on http://{addr}");
            axum_server::bind(addr).serve(app.into_make_service()).await
        }
    };

    if let Err(e) = served {
        tracing::error!("Server stopped: {e}");
    }
}

fn build_router(state: AppState) -> Router {
    // Every route here requires a valid session. Role checks happen in the handlers' extractors.
    let authenticated = Router::new()
        .route("/api/auth/refresh", post(endpoints::refresh))
        .route("/api/auth/logout", post(endpoints::logout))
        .route("/api/auth/update-role", put(endpoints::update_role))
        .route(
            "/api/assignments",
            post(assignment::create).get(assignment::list),
        )
        .route(
            "/api/assignments/{id}",
            get(assignment::get)
                .put(assignment::update)
                .delete(assignment::delete),
        )
        .route("/api/assignments/search/{code}", get(assignment::search))
        .route("/api/submissions/upload", post(submission::upload))
        .route(
            "/api/submissions/assignment/{id}",
            get(submission::by_assignment),
        )
        .route("/api/submissions/student", get(submission::for_student))
        .route("/api/submissions/teacher", get(submission::for_teacher))
        .route("/api/submissions/stats", get(submission::stats))
        .route("/api/submissions/{id}/grade", post(submission::grade))
        .route("/api/submissions/{id}/status", put(submission::update_status))
        .route(
            "/api/submissions/{id}/annotations",
            get(annotation::list).post(annotation::create),
        )
        .route("/api/submissions/download/{id}", get(submission::download))
        .route("/api/annotations/{id}", delete(annotation::delete))
        .route_layer(from_fn_with_state(
            state.clone(),
            security::handle_basic_auth,
        ));

    // Embedded in a frame, so the token may come from the query string
    let embedded = Router::new()
        .route("/api/submissions/view/{id}", get(submission::view))
        .route_layer(from_fn_with_state(
            state.clone(),
            security::handle_embedded_auth,
        ));

    // These endpoints are public
    let public = Router::new()
        .route("/api/auth/login", post(endpoints::login))
        .route("/api/auth/register", post(endpoints::register))
        .route("/api/auth/google", post(endpoints::google_login))
        .route("/api/auth/google/callback", post(endpoints::google_callback))
        .route("/api/health", get(endpoints::health))
        .route("/api/info", get(endpoints::info));

    let body_limit = state.config.storage.max_file_size + BODY_OVERHEAD;
    let cors = cors_layer(&state.config.server);

    authenticated
        .merge(embedded)
        .merge(public)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allows the configured origins, or any origin when `"*"` is listed.
/// `Content-Disposition` is exposed so the client can name downloads.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origin = if server.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            server
                .cors_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_origin(origin)
        .expose_headers([CONTENT_TYPE, CONTENT_DISPOSITION])
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;

    /// A router whose pool never connects. Only requests that fail before the database work.
    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/portal")
            .unwrap();
        build_router(AppState::new(pool, Config::default()))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) =
            send(Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert_eq!(body["port"], 8080);
    }

    #[tokio::test]
    async fn info_lists_features() {
        let (status, body) = send(Request::get("/api/info").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Assignment Management System");
        assert!(body["features"].as_array().is_some_and(|f| !f.is_empty()));
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        for uri in [
            "/api/assignments",
            "/api/submissions/student",
            "/api/submissions/stats",
            "/api/submissions/view/1",
        ] {
            let (status, body) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn malformed_tokens_are_rejected() {
        let request = Request::get("/api/assignments")
            .header(AUTHORIZATION, "Bearer not*base64!")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn query_tokens_only_work_for_the_viewer() {
        for uri in [
            "/api/assignments?token=x",
            "/api/submissions/student?token=x",
            "/api/submissions/download/1?token=x",
        ] {
            let (status, _) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn registration_is_validated_first() {
        let (status, body) = send(json_post(
            "/api/auth/register",
            r#"{ "email": "nope", "password": "123", "firstName": "", "lastName": "Li" }"#,
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation failed");
        assert!(body["errors"]["email"].is_string());
        assert!(body["errors"]["role"].is_string());
        assert!(body["errors"].get("lastName").is_none());
    }

    #[tokio::test]
    async fn google_callback_needs_a_code() {
        let (status, body) = send(json_post(
            "/api/auth/google/callback",
            r#"{ "code": " ", "redirectUri": "http://localhost:5173/auth/callback" }"#,
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Authorization code is missing");
    }

    #[tokio::test]
    async fn cors_allows_the_dev_frontend() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/auth/login")
            .header("Origin", "http://localhost:5173")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let response = app()
            .oneshot(Request::get("/api/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
