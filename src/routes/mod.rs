use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::auth::auth_middleware;
use crate::websocket;
use axum::{middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

pub fn create_routes() -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        // WebSocket route (auth handled inside the handler via query token)
        .route("/ws", routing::get(websocket::events::ws_handler))
}

fn api_routes() -> Router {
    let rate_limit_config = RateLimitConfig::from_env();

    let reports = report_routes(&rate_limit_config);
    let admin = admin_routes(&rate_limit_config);

    reports
        .merge(admin)
        .layer(middleware::from_fn(auth_middleware))
}

/// Report lifecycle routes. Per-report authorization happens in the
/// service; the middleware only establishes identity.
fn report_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route(
            "/reports",
            routing::post(handlers::report::create_report).get(handlers::report::list_reports),
        )
        .route(
            "/reports/{id}",
            routing::get(handlers::report::get_report)
                .patch(handlers::report::update_report)
                .delete(handlers::report::delete_report),
        )
        .route(
            "/reports/{id}/history",
            routing::get(handlers::report::get_report_history),
        )
        .route(
            "/reports/{id}/export",
            routing::get(handlers::report::export_report),
        );

    with_optional_rate_limit(router, config.enabled, config.reports)
}

/// Organization and user administration (system_admin only, checked in the
/// handlers).
fn admin_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route(
            "/admin/organizations",
            routing::post(handlers::organization::create_organization)
                .get(handlers::organization::list_organizations),
        )
        .route(
            "/admin/organizations/{id}",
            routing::get(handlers::organization::get_organization)
                .put(handlers::organization::update_organization),
        )
        .route(
            "/admin/organizations/{id}/users",
            routing::get(handlers::user::list_users),
        )
        .route("/admin/users", routing::post(handlers::user::create_user))
        .route(
            "/admin/users/{id}",
            routing::get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        );

    with_optional_rate_limit(router, config.enabled, config.admin)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
        .expect("Invalid rate limit configuration");

    router.layer(GovernorLayer::new(governor_conf))
}
