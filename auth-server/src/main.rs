// auth-server/src/main.rs
use std::time::Duration;

use actix::Actor;
use actix_web::{web, App, HttpServer};
use auth_server::api;
use auth_server::housekeeping::HousekeepingActor;
use auth_server::middleware::RateLimiter;
use auth_server::AuthService;
use common::{setup_tracing, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Setup tracing
    setup_tracing(config.auth.debug);

    let server_addr = config.server_addr.clone();
    tracing::info!("Starting Wallet Auth Server on {}", server_addr);

    let auth = AuthService::builder(&config.auth).build();

    // Start housekeeping for expired nonces and sessions
    let housekeeping = HousekeepingActor::new(
        auth.clone(),
        Duration::from_secs(config.housekeeping.interval_seconds.max(1)),
    )
    .start();

    let rate_limiter = RateLimiter::from_config(&config.rate_limit);

    let auth_data = web::Data::new(auth);
    let config_data = web::Data::new(config);
    let housekeeping_data = web::Data::new(housekeeping);

    HttpServer::new(move || {
        App::new()
            .wrap(rate_limiter.clone())
            .app_data(auth_data.clone())
            .app_data(config_data.clone())
            .app_data(housekeeping_data.clone())
            .app_data(api::json_config())
            .configure(api::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}
