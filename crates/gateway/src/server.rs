//! Router assembly and the middleware stack wrapped around every route.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, header},
    routing::{delete, get, patch, post},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveHeadersLayer,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// 2 MiB global request body limit; ample for any JSON payload this surface
/// accepts.
const REQUEST_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/sandboxes/start", post(routes::sandboxes::start))
        .route("/sandboxes/{id}/env", post(routes::sandboxes::apply_env))
        .route("/sandboxes/{id}/run-scripts", post(routes::sandboxes::run_scripts))
        .route("/sandboxes/{id}/stop", post(routes::sandboxes::stop))
        .route("/sandboxes/{id}/status", get(routes::sandboxes::status))
        .route(
            "/sandboxes/{id}/publish-devcontainer",
            post(routes::sandboxes::publish_devcontainer),
        )
        .route("/sandboxes/{id}/resume", post(routes::sandboxes::resume))
        .route("/sandboxes/{id}/force-wake", post(routes::sandboxes::force_wake))
        .route(
            "/sandboxes/{id}/refresh-github-auth",
            post(routes::sandboxes::refresh_github_auth),
        )
        .route(
            "/sandboxes/{id}/discover-repos",
            post(routes::sandboxes::discover_repos),
        )
        .route("/sandboxes/{id}/ssh", get(routes::sandboxes::ssh))
        .route("/environments", post(routes::environments::create))
        .route("/environments", get(routes::environments::list))
        .route("/environments/{id}", get(routes::environments::get))
        .route("/environments/{id}", patch(routes::environments::patch))
        .route("/environments/{id}", delete(routes::environments::delete))
        .route("/environments/{id}/vars", get(routes::environments::get_vars))
        .route("/environments/{id}/vars", patch(routes::environments::patch_vars))
        .route("/environments/{id}/ports", patch(routes::environments::patch_ports))
        .route(
            "/environments/{id}/snapshots",
            get(routes::environments::list_snapshots),
        )
        .route(
            "/environments/{id}/snapshots",
            post(routes::environments::create_snapshot),
        )
        .route(
            "/environments/{id}/snapshots/{version_id}/activate",
            post(routes::environments::activate_snapshot),
        )
        .with_state(state);

    apply_middleware_stack(router, build_cors_layer())
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let provider = state.config.active_provider().map(|p| p.to_string());
    Json(json!({"status": "ok", "provider": provider}))
}

/// The gateway has no browser UI of its own and no fixed set of caller
/// origins known at build time, so CORS is permissive at this layer;
/// authorization is enforced per-request by [`crate::auth::Caller`] instead.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

/// Layer order (outermost to innermost for requests):
/// 1. `CatchPanicLayer` — converts handler panics to 500s
/// 2. `SetSensitiveHeadersLayer` — marks Authorization/Cookie as redacted in traces
/// 3. `SetRequestIdLayer` — generates x-request-id before tracing
/// 4. `TraceLayer` — logs requests with redacted headers and the request id
/// 5. `CorsLayer`
/// 6. `PropagateRequestIdLayer` — copies x-request-id onto the response
/// 7. Security response headers
/// 8. `RequestBodyLimitLayer`
/// 9. `CompressionLayer` (innermost)
fn apply_middleware_stack<S>(router: Router<S>, cors: CorsLayer) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(CompressionLayer::new())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("deny"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    router
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
        ]))
        .layer(CatchPanicLayer::new())
}
