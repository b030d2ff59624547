//! Same routes as [`super::router`], served from process memory. Nothing is
//! written to disk and everything is gone once the process exits.

use std::time::Duration;

use pcdb_store::{DeletePolicy, InMemBackend, Store};

use super::{router, AppState};

pub fn make_router() -> axum::Router {
    let store = Store::new(Box::new(InMemBackend::new()), DeletePolicy::default());
    router::make_router(AppState::new(store), Duration::from_secs(4))
}
