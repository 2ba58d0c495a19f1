use crate::{
    api::{attendance, compensation, payroll, period, policy},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Built once so every worker shares the same quota.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / u64::from(requests_per_min)).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit of {requests_per_min} per minute"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, protected_limiter: Limiter) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/payroll")
                    .service(web::resource("/compute").route(web::post().to(payroll::compute_payroll)))
                    .service(web::resource("/recompute").route(web::post().to(payroll::recompute_payrolls)))
                    // /payroll/batch
                    .service(web::resource("/batch").route(web::post().to(payroll::start_batch)))
                    .service(web::resource("/batch/{run_id}").route(web::get().to(payroll::batch_status)))
                    .service(
                        web::resource("/batch/{run_id}/cancel").route(web::post().to(payroll::cancel_batch)),
                    )
                    // /payroll/{id}
                    .service(web::resource("/{id}").route(web::get().to(payroll::get_payroll)))
                    .service(
                        web::resource("/{id}/status").route(web::put().to(payroll::transition_payroll)),
                    ),
            )
            .service(
                web::scope("/periods")
                    .service(web::resource("").route(web::get().to(period::list_periods)))
                    .service(web::resource("/generate").route(web::post().to(period::generate_periods)))
                    .service(web::resource("/{id}").route(web::delete().to(period::delete_period))),
            )
            .service(
                web::scope("/policies")
                    .service(web::resource("/applicable").route(web::get().to(policy::applicable_policies))),
            )
            .service(
                web::scope("/compensation")
                    .service(web::resource("/bulk-update").route(web::post().to(compensation::bulk_update))),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(web::resource("/check-out").route(web::put().to(attendance::check_out)))
                    // /attendance/break
                    .service(
                        web::resource("/break")
                            .route(web::post().to(attendance::start_break))
                            .route(web::put().to(attendance::end_break)),
                    ),
            ),
    );
}
