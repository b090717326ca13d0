//! Lease-based leader election.
//!
//! Mutual exclusion across redundant controller replicas via a coordination
//! `Lease` object. One replica holds the lease and renews it; the others
//! poll until the holder's lease expires. Losing a renewal round drops
//! leadership, which the bootstrap treats as fatal so the process restarts
//! cleanly.

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Shared leadership flag, cloneable across tasks.
#[derive(Debug, Clone, Default)]
pub struct LeaderStatus(Arc<AtomicBool>);

impl LeaderStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_leader(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Marks this replica as leader without running an election (used when
    /// leader election is disabled).
    pub fn force_leader(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn set(&self, leader: bool) {
        self.0.store(leader, Ordering::SeqCst);
    }
}

/// Settings for the election loop.
#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    /// Name of the Lease object (the lock identifier).
    pub lease_name: String,
    /// Namespace holding the Lease.
    pub lease_namespace: String,
    /// Identity recorded as the lease holder.
    pub holder_id: String,
    /// Seconds after the last renewal at which the lease is considered
    /// expired.
    pub lease_ttl_secs: i64,
}

impl LeaderElectionConfig {
    /// Builds a config with a per-process holder identity.
    pub fn new(lease_name: impl Into<String>) -> Self {
        let hostname =
            env::var("HOSTNAME").unwrap_or_else(|_| "newresource-controller".to_string());
        Self {
            lease_name: lease_name.into(),
            lease_namespace: env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            holder_id: format!("{}-{}", hostname, Uuid::new_v4()),
            lease_ttl_secs: 15,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LeaseState {
    HeldBySelf,
    HeldByOther,
    Free,
}

/// Classifies a lease spec relative to one holder identity.
fn lease_state(spec: &LeaseSpec, holder_id: &str, now: DateTime<Utc>) -> LeaseState {
    let Some(holder) = spec.holder_identity.as_deref() else {
        return LeaseState::Free;
    };
    if holder == holder_id {
        return LeaseState::HeldBySelf;
    }
    let ttl = Duration::seconds(i64::from(spec.lease_duration_seconds.unwrap_or(0)));
    match spec.renew_time.as_ref() {
        Some(renewed) if renewed.0 + ttl > now => LeaseState::HeldByOther,
        _ => LeaseState::Free,
    }
}

/// Runs the acquire/renew loop forever, reflecting the outcome into
/// `status`.
pub async fn run(client: Client, config: LeaderElectionConfig, status: LeaderStatus) {
    let api: Api<Lease> = Api::namespaced(client, &config.lease_namespace);
    let period =
        std::time::Duration::from_secs((config.lease_ttl_secs / 3).max(1).unsigned_abs());

    loop {
        match try_acquire_or_renew(&api, &config).await {
            Ok(held) => {
                if held && !status.is_leader() {
                    info!(holder = %config.holder_id, "Acquired leadership");
                } else if !held && status.is_leader() {
                    warn!(holder = %config.holder_id, "Lost leadership");
                }
                status.set(held);
            }
            Err(err) => {
                warn!("Leader election round failed: {}", err);
                status.set(false);
            }
        }
        tokio::time::sleep(period).await;
    }
}

/// One election round: create the lease if absent, renew when held by us,
/// take over when expired. A write conflict means another replica moved
/// first; that round simply reports "not held".
async fn try_acquire_or_renew(
    api: &Api<Lease>,
    config: &LeaderElectionConfig,
) -> Result<bool, kube::Error> {
    let now = Utc::now();
    let pp = PostParams::default();

    let Some(mut lease) = api.get_opt(&config.lease_name).await? else {
        let fresh = fresh_lease(config, now);
        return match api.create(&pp, &fresh).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 409 => Ok(false),
            Err(err) => Err(err),
        };
    };

    let mut spec = lease.spec.take().unwrap_or_default();
    match lease_state(&spec, &config.holder_id, now) {
        LeaseState::HeldByOther => Ok(false),
        LeaseState::HeldBySelf => {
            spec.renew_time = Some(MicroTime(now));
            lease.spec = Some(spec);
            replace_lease(api, config, &pp, &lease).await
        }
        LeaseState::Free => {
            spec.holder_identity = Some(config.holder_id.clone());
            spec.acquire_time = Some(MicroTime(now));
            spec.renew_time = Some(MicroTime(now));
            spec.lease_duration_seconds = Some(config.lease_ttl_secs as i32);
            spec.lease_transitions = Some(spec.lease_transitions.unwrap_or(0) + 1);
            lease.spec = Some(spec);
            replace_lease(api, config, &pp, &lease).await
        }
    }
}

async fn replace_lease(
    api: &Api<Lease>,
    config: &LeaderElectionConfig,
    pp: &PostParams,
    lease: &Lease,
) -> Result<bool, kube::Error> {
    match api.replace(&config.lease_name, pp, lease).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(response)) if response.code == 409 => Ok(false),
        Err(err) => Err(err),
    }
}

fn fresh_lease(config: &LeaderElectionConfig, now: DateTime<Utc>) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(config.lease_name.clone()),
            namespace: Some(config.lease_namespace.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(config.holder_id.clone()),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_duration_seconds: Some(config.lease_ttl_secs as i32),
            lease_transitions: Some(0),
            ..LeaseSpec::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(holder: Option<&str>, renewed_secs_ago: i64, ttl: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: holder.map(String::from),
            renew_time: Some(MicroTime(Utc::now() - Duration::seconds(renewed_secs_ago))),
            lease_duration_seconds: Some(ttl),
            ..LeaseSpec::default()
        }
    }

    #[test]
    fn empty_spec_is_free() {
        assert_eq!(
            lease_state(&LeaseSpec::default(), "me", Utc::now()),
            LeaseState::Free
        );
    }

    #[test]
    fn own_holder_identity_is_held_by_self() {
        assert_eq!(
            lease_state(&spec(Some("me"), 0, 15), "me", Utc::now()),
            LeaseState::HeldBySelf
        );
    }

    #[test]
    fn live_foreign_lease_is_held_by_other() {
        assert_eq!(
            lease_state(&spec(Some("them"), 5, 15), "me", Utc::now()),
            LeaseState::HeldByOther
        );
    }

    #[test]
    fn expired_foreign_lease_is_free() {
        assert_eq!(
            lease_state(&spec(Some("them"), 30, 15), "me", Utc::now()),
            LeaseState::Free
        );
    }

    #[test]
    fn foreign_lease_without_renew_time_is_free() {
        let mut s = spec(Some("them"), 0, 15);
        s.renew_time = None;
        assert_eq!(lease_state(&s, "me", Utc::now()), LeaseState::Free);
    }

    #[test]
    fn leader_status_toggles() {
        let status = LeaderStatus::new();
        assert!(!status.is_leader());
        status.force_leader();
        assert!(status.is_leader());
        status.set(false);
        assert!(!status.is_leader());
    }
}
