pub mod backups;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_http::validate_request::ValidateRequestHeaderLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = backups::router().layer(TraceLayer::new_for_http());

    if let (Some(user), Some(pass)) = (&state.config.username, &state.config.password) {
        // Fixed single-credential basic auth is exactly this service's
        // contract, so the "too basic" deprecation does not apply.
        #[allow(deprecated)]
        {
            router = router.layer(ValidateRequestHeaderLayer::basic(user, pass));
        }
    }

    router.with_state(state)
}
