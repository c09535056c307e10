use axum::Router;

use crate::entitlements;

pub fn api_routes() -> Router {
    Router::new().merge(entitlements::api::routes())
}
