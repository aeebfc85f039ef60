// auth-server/src/housekeeping.rs
use std::time::Duration;

use actix::{Actor, ActorFutureExt, AsyncContext, Context, Handler, Message, ResponseActFuture, WrapFuture};

use crate::auth::{AuthError, AuthService, PurgeStats};

/// Actor message: drop expired nonces and sessions now, and reset the key cache
#[derive(Message)]
#[rtype(result = "Result<PurgeStats, AuthError>")]
pub struct PurgeExpired;

/// Actor message: current store sizes
#[derive(Message)]
#[rtype(result = "Result<StoreMetrics, AuthError>")]
pub struct GetStoreMetrics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    pub nonces: usize,
    pub sessions: usize,
    pub cached_keys: usize,
    /// Entries removed since the actor started
    pub purged_total: usize,
    /// Imported keys dropped from the cache since the actor started
    pub keys_evicted_total: usize,
}

/// Periodically sweeps expired auth state. Verification never depends on
/// it; expired records are rejected at lookup time either way.
pub struct HousekeepingActor {
    auth: AuthService,
    interval: Duration,
    purged_total: usize,
    keys_evicted_total: usize,
}

impl HousekeepingActor {
    pub fn new(auth: AuthService, interval: Duration) -> Self {
        Self {
            auth,
            interval,
            purged_total: 0,
            keys_evicted_total: 0,
        }
    }
}

impl Actor for HousekeepingActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HousekeepingActor started with interval: {:?}", self.interval);

        ctx.run_interval(self.interval, |_act, ctx| {
            ctx.notify(PurgeExpired);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            "HousekeepingActor stopped. {} expired entries purged during lifetime",
            self.purged_total
        );
    }
}

impl Handler<PurgeExpired> for HousekeepingActor {
    type Result = ResponseActFuture<Self, Result<PurgeStats, AuthError>>;

    fn handle(&mut self, _msg: PurgeExpired, _ctx: &mut Self::Context) -> Self::Result {
        let auth = self.auth.clone();
        Box::pin(
            async move { auth.purge_expired().await }
                .into_actor(self)
                .map(|result, act, _ctx| {
                    match &result {
                        Ok(stats) => {
                            act.purged_total += stats.total();
                            act.keys_evicted_total += stats.cached_keys;
                            if stats.total() > 0 {
                                tracing::info!(
                                    "Purged {} expired nonces and {} expired sessions",
                                    stats.nonces,
                                    stats.sessions
                                );
                            }
                            if stats.cached_keys > 0 {
                                tracing::debug!("Dropped {} cached public keys", stats.cached_keys);
                            }
                        }
                        Err(e) => tracing::error!("Housekeeping purge failed: {}", e),
                    }
                    result
                }),
        )
    }
}

impl Handler<GetStoreMetrics> for HousekeepingActor {
    type Result = ResponseActFuture<Self, Result<StoreMetrics, AuthError>>;

    fn handle(&mut self, _msg: GetStoreMetrics, _ctx: &mut Self::Context) -> Self::Result {
        let auth = self.auth.clone();
        Box::pin(
            async move { auth.store_counts().await }
                .into_actor(self)
                .map(|result, act, _ctx| {
                    result.map(|counts| StoreMetrics {
                        nonces: counts.nonces,
                        sessions: counts.sessions,
                        cached_keys: counts.cached_keys,
                        purged_total: act.purged_total,
                        keys_evicted_total: act.keys_evicted_total,
                    })
                }),
        )
    }
}
