//! Partybox HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth;
use crate::auth::session::SessionIssuer;
use crate::ledger::QuotaLedger;
use crate::observability;
use crate::roster::RosterCache;
use crate::store::PartyStore;
use axum::Router;
use axum::routing::{get, post, put};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub api_version: String,
    pub store: Arc<dyn PartyStore>,
    pub sessions: Arc<SessionIssuer>,
    pub roster: Arc<RosterCache>,
    pub ledger: QuotaLedger,
}

impl AppState {
    /// Wire the ledger and roster cache around `store`.
    pub fn new(store: Arc<dyn PartyStore>, sessions: SessionIssuer, history_limit: usize) -> Self {
        let roster = Arc::new(RosterCache::new());
        let ledger = QuotaLedger::new(store.clone(), roster.clone(), history_limit);
        Self {
            service_name: "partybox".to_string(),
            api_version: "v1".to_string(),
            store,
            sessions: Arc::new(sessions),
            roster,
            ledger,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/v1/system/info", get(api::system::system_info))
        .route("/v1/system/health", get(api::system::system_health))
        .route("/v1/session", post(auth::admin::login))
        .route(
            "/v1/parties",
            get(api::parties::list_parties).post(api::parties::create_party),
        )
        .route(
            "/v1/parties/:id",
            get(api::parties::get_party)
                .put(api::parties::update_party)
                .delete(api::parties::delete_party),
        )
        .route(
            "/v1/participants",
            get(api::participants::list_participants).post(api::participants::create_participant),
        )
        .route(
            "/v1/participants/:id",
            axum::routing::delete(api::participants::delete_participant),
        )
        .route(
            "/v1/participants/:id/quota",
            put(api::participants::update_quota),
        )
        .route(
            "/v1/maintenance/normalize-history",
            post(api::participants::normalize_history),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
