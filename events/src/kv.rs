//! Replica coordination over JetStream KV.
//!
//! Each facility exposes `replica_count` lease slots. A worker claims a
//! free slot with a compare-and-set create, renews it at a fraction of
//! the bucket TTL, and purges it on drain. A slot whose holder stops
//! renewing expires and becomes claimable again.

use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::kv;
use uuid::Uuid;

use crate::EventsError;

pub const LEASE_BUCKET: &str = "assayer-worker-leases";

/// KV key for one lease slot of a facility.
pub fn lease_key(facility: &str, slot: usize) -> String {
    format!("{facility}.slot-{slot}")
}

pub struct LeaseKeeper {
    store: kv::Store,
    key: String,
    holder: String,
    revision: u64,
    ttl: Duration,
}

impl LeaseKeeper {
    /// Claim one of the facility's lease slots. Fails with
    /// [`EventsError::NoLeaseSlot`] when all slots are held by peers,
    /// which bounds the number of active worker replicas.
    pub async fn acquire(
        client: async_nats::Client,
        facility: &str,
        replica_count: usize,
        ttl: Duration,
    ) -> Result<Self, EventsError> {
        let context = jetstream::new(client);
        let store = match context.get_key_value(LEASE_BUCKET).await {
            Ok(store) => store,
            Err(_) => context
                .create_key_value(kv::Config {
                    bucket: LEASE_BUCKET.to_string(),
                    max_age: ttl,
                    ..Default::default()
                })
                .await
                .map_err(|e| EventsError::JetStream(e.to_string()))?,
        };

        let holder = Uuid::new_v4().to_string();

        for slot in 0..replica_count {
            let key = lease_key(facility, slot);
            // Revision 0 expectation: succeeds only while the slot has
            // no live entry.
            match store.update(&key, holder.clone().into(), 0).await {
                Ok(revision) => {
                    tracing::info!(facility, key = %key, "lease slot claimed");
                    return Ok(Self {
                        store,
                        key,
                        holder,
                        revision,
                        ttl,
                    });
                }
                Err(e) => {
                    tracing::debug!(facility, key = %key, error = %e, "lease slot unavailable");
                }
            }
        }

        Err(EventsError::NoLeaseSlot(facility.to_string()))
    }

    /// How often [`renew`](Self::renew) should be called to keep the
    /// claim from expiring.
    pub fn renew_interval(&self) -> Duration {
        self.ttl / 3
    }

    /// Refresh the claim. Fails if the slot was lost (revision moved),
    /// in which case the worker must stop accepting new conditions.
    pub async fn renew(&mut self) -> Result<(), EventsError> {
        self.revision = self
            .store
            .update(&self.key, self.holder.clone().into(), self.revision)
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))?;
        Ok(())
    }

    /// Give the slot up so a peer can claim it without waiting for the
    /// TTL to lapse.
    pub async fn release(self) -> Result<(), EventsError> {
        self.store
            .purge(&self.key)
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))?;
        tracing::info!(key = %self.key, "lease slot released");
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_keys_are_facility_and_slot_scoped() {
        assert_eq!(lease_key("dc13", 0), "dc13.slot-0");
        assert_eq!(lease_key("dc13", 2), "dc13.slot-2");
        assert_ne!(lease_key("dc13", 0), lease_key("dc14", 0));
    }
}
