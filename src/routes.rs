use crate::{
    api::{attendance, employee, location},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            // both inputs are clamped to at least 1 above
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/change-password")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::change_password)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(
                        web::resource("/check-out").route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/history").route(web::get().to(attendance::history)))
                    .service(web::resource("/report").route(web::get().to(attendance::report))),
            )
            .service(
                web::scope("/location")
                    // /location
                    .service(web::resource("").route(web::post().to(location::report_location)))
                    // /location/current
                    .service(
                        web::resource("/current").route(web::get().to(location::current_location)),
                    ),
            )
            .service(web::resource("/tracking").route(web::get().to(location::tracking_snapshot)))
            .service(web::resource("/office-hours").route(web::get().to(location::office_hours)))
            .service(
                web::scope("/employee")
                    // /employee
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // /employee/{id}
                    .service(web::resource("/{id}").route(web::get().to(employee::get_employee)))
                    // /employee/{id}/office
                    .service(
                        web::resource("/{id}/office").route(web::put().to(employee::set_office)),
                    )
                    // /employee/{id}/approve
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(employee::approve_employee)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  ├─ refresh_token (7 days)
//  └─ session: live tracking while office hours are open

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token is spent

// LOGOUT
//  └─ POST /auth/logout with refresh_token
//       └─ revokes it and tears the session down

// CHANGE PASSWORD
//  └─ POST /auth/change-password with access_token
//       └─ every refresh token of the user is revoked
