#![allow(clippy::missing_docs_in_private_items)]

use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    documents::{claim_readiness, register_document},
    engines::{engine_status, force_expire, sweep_engines},
    liveness::live,
    query::query_claim,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new().route("/live", get(live));

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route("/claims/{claim_id}/documents", post(register_document))
        .route("/claims/{claim_id}/readiness", get(claim_readiness))
        .route("/claims/{claim_id}/query", post(query_claim))
        .route(
            "/claims/{claim_id}/engine",
            get(engine_status).delete(force_expire),
        )
        .route("/engines/sweep", post(sweep_engines))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
