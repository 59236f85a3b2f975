//! Condition-driven collection worker.
//!
//! Pulls conditions for the configured facility off the stream, claims a
//! replica lease slot, and dispatches bounded-concurrency collection
//! cycles. A full pool back-pressures message receipt; cancellation
//! drains in-flight cycles instead of interrupting them. Lease renewal
//! runs as its own task so back-pressure cannot hold it past the TTL.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use asset_model::{Asset, ConditionKind};
use asset_store::{Repository, StoreError};
use collector::{DeviceCollector, OutputFn};
use events::{ConditionMessage, ConditionStream, EventsError, LeaseKeeper};
use shared_config::Config;

/// How long an unrenewed lease slot stays claimed.
const LEASE_TTL: Duration = Duration::from_secs(60);

/// Page size for the periodic fleet sweep.
const SWEEP_PAGE_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("events: {0}")]
    Events(#[from] EventsError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Subscribed,
    Dispatching,
    Draining,
    Stopped,
}

pub struct Worker {
    facility: String,
    concurrency: usize,
    replica_count: usize,
    collect_interval: Duration,
    collect_splay: Duration,
    nats: shared_config::NatsConfig,
    repository: Arc<dyn Repository>,
    collector: Arc<DeviceCollector>,
    output: OutputFn,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        cfg: &Config,
        repository: Arc<dyn Repository>,
        collector: Arc<DeviceCollector>,
    ) -> Self {
        Self {
            facility: cfg.facility_code.clone(),
            concurrency: cfg.concurrency,
            replica_count: cfg.replica_count,
            collect_interval: cfg.collect_interval,
            collect_splay: cfg.collect_splay,
            nats: cfg.nats.clone(),
            repository,
            collector,
            output: log_output(),
            state: WorkerState::Idle,
        }
    }

    /// Replace the per-asset output hook (tests, fixture capture).
    pub fn with_output(mut self, output: OutputFn) -> Self {
        self.output = output;
        self
    }

    /// Run until cancelled or until the replica lease is lost, then
    /// drain in-flight collection cycles.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let client = events::connect(&self.nats).await?;
        let lease = LeaseKeeper::acquire(
            client.clone(),
            &self.facility,
            self.replica_count,
            LEASE_TTL,
        )
        .await?;
        let mut stream = ConditionStream::subscribe(client, &self.facility).await?;
        self.transition(WorkerState::Subscribed);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();

        // Renewal must keep ticking while dispatch waits on a full pool,
        // so it gets its own task instead of a select arm.
        let renew_stop = CancellationToken::new();
        let lease_lost = CancellationToken::new();
        let renewal = tokio::spawn(renew_lease(lease, renew_stop.clone(), lease_lost.clone()));

        let mut sweep = Box::pin(tokio::time::sleep(self.sweep_delay()));

        self.transition(WorkerState::Dispatching);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = lease_lost.cancelled() => {
                    tracing::warn!("lease slot lost, draining");
                    break;
                }

                () = &mut sweep => {
                    let pass = sweep_fleet(
                        Arc::clone(&self.repository),
                        Arc::clone(&self.collector),
                        Arc::clone(&self.output),
                        cancel.clone(),
                        Arc::clone(&semaphore),
                    );
                    tasks.spawn(async move {
                        if let Err(e) = pass.await {
                            tracing::warn!(error = %e, "fleet sweep failed");
                        }
                    });
                    sweep.as_mut().reset(tokio::time::Instant::now() + self.sweep_delay());
                }

                received = stream.next() => {
                    match received {
                        None => {
                            tracing::warn!("condition stream closed, draining");
                            break;
                        }
                        Some(Err(e)) => tracing::warn!(error = %e, "condition receive failed"),
                        Some(Ok(message)) => self.dispatch(message, &cancel, &semaphore, &mut tasks).await,
                    }
                }

                Some(_finished) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        self.transition(WorkerState::Draining);
        while tasks.join_next().await.is_some() {}

        // The slot stays held until in-flight cycles finish.
        renew_stop.cancel();
        if renewal.await.is_err() {
            tracing::warn!("lease renewal task failed");
        }

        self.transition(WorkerState::Stopped);
        Ok(())
    }

    /// Dispatch one received condition. Waiting for a pool permit here
    /// pauses message receipt while the pool is full; a cancelled worker
    /// leaves the message unacked for redelivery to a live replica.
    async fn dispatch(
        &self,
        message: ConditionMessage,
        cancel: &CancellationToken,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<()>,
    ) {
        let condition = match message.condition() {
            Ok(condition) => condition,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable condition, acking to drop it");
                if let Err(e) = message.ack().await {
                    tracing::warn!(error = %e, "condition ack failed");
                }
                return;
            }
        };

        if condition.kind != ConditionKind::InventoryOutofband {
            if let Err(e) = message.ack().await {
                tracing::warn!(error = %e, "condition ack failed");
            }
            return;
        }

        let permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            permit = Arc::clone(semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_closed) => return,
            },
        };

        tracing::info!(
            condition_id = %condition.id,
            asset_id = %condition.asset_id,
            "dispatching collection",
        );

        let collector = Arc::clone(&self.collector);
        let output = Arc::clone(&self.output);
        let task_cancel = cancel.clone();
        tasks.spawn(async move {
            let mut asset = Asset::new(condition.asset_id);
            if let Err(e) = collector
                .collect_outofband(&task_cancel, &mut asset, &output)
                .await
            {
                tracing::warn!(asset_id = %asset.id, error = %e, "collection failed");
            }

            // Acked whatever the outcome: a stuck asset must not block
            // the queue, re-submission is the condition producer's call.
            if let Err(e) = message.ack().await {
                tracing::warn!(asset_id = %asset.id, error = %e, "condition ack failed");
            }

            drop(permit);
        });
    }

    /// Sweep interval plus up to `collect_splay` of random jitter, so
    /// replicas do not sweep in lockstep.
    fn sweep_delay(&self) -> Duration {
        let splay_secs = self.collect_splay.as_secs();
        let jitter = if splay_secs == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(rand::thread_rng().gen_range(0..=splay_secs))
        };
        self.collect_interval + jitter
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::info!(from = ?self.state, to = ?next, "worker state change");
        self.state = next;
    }
}

/// Keep the claimed slot renewed until stopped, then release it. A
/// failed renewal means the slot is already gone: flag the loss and
/// leave the entry for its new holder.
async fn renew_lease(mut lease: LeaseKeeper, stop: CancellationToken, lost: CancellationToken) {
    let mut renew = tokio::time::interval(lease.renew_interval());
    renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    renew.tick().await; // interval fires immediately once

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,

            _ = renew.tick() => {
                if let Err(e) = lease.renew().await {
                    tracing::warn!(key = lease.key(), error = %e, "lease renewal failed");
                    lost.cancel();
                    return;
                }
            }
        }
    }

    if let Err(e) = lease.release().await {
        tracing::warn!(error = %e, "lease release failed");
    }
}

/// One refresh pass over the whole fleet, paged through the store and
/// pushed through the same bounded pool as conditions. Runs as a task in
/// the worker's join set and finishes only once its own collection
/// cycles have, so draining covers sweeps too.
async fn sweep_fleet(
    repository: Arc<dyn Repository>,
    collector: Arc<DeviceCollector>,
    output: OutputFn,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
) -> Result<(), WorkerError> {
    let mut cycles: JoinSet<()> = JoinSet::new();
    let mut offset = 0;
    let mut dispatched = 0;

    'pages: loop {
        let (assets, total) = repository
            .assets_by_offset_limit(offset, SWEEP_PAGE_SIZE)
            .await?;
        if assets.is_empty() {
            break;
        }

        for stored in assets {
            let permit = tokio::select! {
                biased;

                _ = cancel.cancelled() => break 'pages,

                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break 'pages,
                },
            };

            let collector = Arc::clone(&collector);
            let output = Arc::clone(&output);
            let task_cancel = cancel.clone();
            cycles.spawn(async move {
                let mut asset = Asset::new(stored.id);
                if let Err(e) = collector
                    .collect_outofband(&task_cancel, &mut asset, &output)
                    .await
                {
                    tracing::warn!(asset_id = %asset.id, error = %e, "sweep collection failed");
                }
                drop(permit);
            });
            dispatched += 1;
        }

        offset += SWEEP_PAGE_SIZE;
        if offset >= total {
            break;
        }
    }

    while cycles.join_next().await.is_some() {}
    tracing::info!(dispatched, "fleet sweep complete");
    Ok(())
}

fn log_output() -> OutputFn {
    Arc::new(|asset: &Asset| {
        if asset.errors.is_empty() {
            tracing::info!(asset_id = %asset.id, "collection complete");
        } else {
            tracing::warn!(asset_id = %asset.id, errors = ?asset.errors, "collection completed with errors");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use asset_store::MockStore;
    use collector::MockQueryor;

    fn worker() -> Worker {
        let cfg = Config::from_env();
        let store = MockStore::new(3);
        let queryor = Arc::new(MockQueryor::default());
        let collector = Arc::new(DeviceCollector::new(
            store.clone(),
            queryor,
            cfg.facility_code.clone(),
        ));
        Worker::new(&cfg, store, collector)
    }

    fn counting_output() -> (OutputFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let output: OutputFn = Arc::new(move |_asset: &Asset| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (output, count)
    }

    #[test]
    fn sweep_delay_stays_within_splay_bounds() {
        let mut w = worker();
        w.collect_interval = Duration::from_secs(600);
        w.collect_splay = Duration::from_secs(60);

        for _ in 0..32 {
            let delay = w.sweep_delay();
            assert!(delay >= Duration::from_secs(600));
            assert!(delay <= Duration::from_secs(660));
        }
    }

    #[test]
    fn zero_splay_means_fixed_interval() {
        let mut w = worker();
        w.collect_interval = Duration::from_secs(600);
        w.collect_splay = Duration::ZERO;
        assert_eq!(w.sweep_delay(), Duration::from_secs(600));
    }

    #[test]
    fn worker_starts_idle() {
        assert_eq!(worker().state, WorkerState::Idle);
    }

    #[tokio::test]
    async fn sweep_pages_every_asset_through_the_pool() {
        let store = MockStore::new(7);
        let queryor = Arc::new(MockQueryor::default());
        let collector = Arc::new(DeviceCollector::new(store.clone(), queryor, "dc13"));
        let (output, count) = counting_output();

        sweep_fleet(
            store,
            collector,
            output,
            CancellationToken::new(),
            Arc::new(Semaphore::new(2)),
        )
        .await
        .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn cancelled_sweep_dispatches_nothing() {
        let store = MockStore::new(3);
        let queryor = Arc::new(MockQueryor::default());
        let collector = Arc::new(DeviceCollector::new(store.clone(), queryor, "dc13"));
        let (output, count) = counting_output();

        let cancel = CancellationToken::new();
        cancel.cancel();

        sweep_fleet(store, collector, output, cancel, Arc::new(Semaphore::new(2)))
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_pool_does_not_block_cancellation() {
        let store = MockStore::new(3);
        let queryor = Arc::new(MockQueryor::default());
        let collector = Arc::new(DeviceCollector::new(store.clone(), queryor, "dc13"));
        let (output, count) = counting_output();

        let semaphore = Arc::new(Semaphore::new(1));
        let held = Arc::clone(&semaphore).acquire_owned().await.unwrap();

        let cancel = CancellationToken::new();
        let pass = tokio::spawn(sweep_fleet(
            store,
            collector,
            output,
            cancel.clone(),
            Arc::clone(&semaphore),
        ));

        // The sweep is parked waiting for a permit; cancellation must
        // still get through to it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        pass.await.unwrap().unwrap();

        drop(held);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
