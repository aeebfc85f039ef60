// auth-server/src/api/mod.rs
pub mod auth;

pub use self::auth::json_config;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/api")
            .service(auth::api_index)
            .service(auth::issue_nonce)
            .service(auth::verify)
            .service(auth::get_session)
            .service(auth::logout)
    );
}
