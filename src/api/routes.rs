use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/chapters", web::post().to(handlers::add_chapters))
            .route("/users", web::post().to(handlers::register_user))
            .route("/users/{username}", web::get().to(handlers::get_user))
            .route("/wallet/balance/{address}", web::get().to(handlers::get_wallet_balance))
            .route("/rewards", web::post().to(handlers::submit_reward))
            .route("/rewards/pending", web::get().to(handlers::get_pending_rewards))
            .route("/rewards/flush", web::post().to(handlers::flush_rewards))
            .route("/checkin", web::post().to(handlers::check_in))
    );
}
