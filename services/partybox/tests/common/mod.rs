#![allow(dead_code)]

use partybox::app::AppState;
use partybox::auth::session::SessionIssuer;
use partybox::config::AdminConfig;
use partybox::store::PartyStore;
use std::sync::Arc;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "adminpw";

pub fn admin_config() -> AdminConfig {
    AdminConfig {
        username: ADMIN_USER.to_string(),
        password: ADMIN_PASSWORD.to_string(),
        session_secret: "integration-secret".to_string(),
        session_ttl_secs: 600,
    }
}

pub fn state_with_store(store: Arc<dyn PartyStore>) -> AppState {
    AppState::new(
        store,
        SessionIssuer::new(&admin_config()),
        partybox_common::MAX_HISTORY_ITEMS,
    )
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
