//! Periodic refresh: one cycle at startup, then one per interval.
//!
//! Only one cycle runs at a time. A tick that arrives while a cycle is still in
//! flight is dropped. A manual request arriving mid-cycle is folded into a single
//! follow-up run, so a registry edit is never answered with a list read before it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Notify, watch},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};

use crate::{
    aggregator::{Aggregator, CycleState, RefreshOutcome},
    registry::SharedRegistry,
};

pub type LatestOutcome = Option<Arc<RefreshOutcome>>;

/// Runs refresh cycles against a shared registry and publishes the results.
#[derive(Debug, Clone)]
pub struct RefreshCycle {
    aggregator: Aggregator,
    registry: SharedRegistry,
    in_flight: Arc<AtomicBool>,
    rerun: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<CycleState>>,
    outcome_tx: Arc<watch::Sender<LatestOutcome>>,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshCycle {
    pub fn new(aggregator: Aggregator, registry: SharedRegistry) -> Self {
        let (state_tx, _) = watch::channel(CycleState::Idle);
        let (outcome_tx, _) = watch::channel(None);

        Self {
            aggregator,
            registry,
            in_flight: Arc::new(AtomicBool::new(false)),
            rerun: Arc::new(AtomicBool::new(false)),
            state_tx: Arc::new(state_tx),
            outcome_tx: Arc::new(outcome_tx),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CycleState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state_tx.subscribe()
    }

    /// Receiver for the most recent settled outcome.
    pub fn subscribe(&self) -> watch::Receiver<LatestOutcome> {
        self.outcome_tx.subscribe()
    }

    pub fn latest(&self) -> LatestOutcome {
        self.outcome_tx.borrow().clone()
    }

    fn claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run one cycle unless another is already in flight, in which case `None`
    /// is returned and nothing is fetched.
    pub async fn try_run(&self) -> Option<Arc<RefreshOutcome>> {
        if !self.claim() {
            tracing::debug!("Refresh cycle already in flight; skipping");
            return None;
        }
        Some(self.run_claimed().await)
    }

    /// Like [`try_run`](Self::try_run), but when a cycle is already in flight
    /// it is asked to go once more after it settles, and that later outcome is
    /// the one published.
    pub async fn run_or_queue(&self) -> Option<Arc<RefreshOutcome>> {
        if !self.claim() {
            self.rerun.store(true, Ordering::SeqCst);
            // The running cycle may have finished between the two checks.
            if !self.claim() {
                tracing::debug!("Refresh cycle in flight; queued a follow-up run");
                return None;
            }
        }
        Some(self.run_claimed().await)
    }

    /// Caller holds the in-flight flag.
    async fn run_claimed(&self) -> Arc<RefreshOutcome> {
        loop {
            let guard = InFlightGuard(Arc::clone(&self.in_flight));

            let outcome = loop {
                self.rerun.store(false, Ordering::SeqCst);
                let outcome = self.run_once().await;
                if !self.rerun.load(Ordering::SeqCst) {
                    break outcome;
                }
                tracing::debug!("Refresh requested mid-cycle; running again");
            };

            // Clear the flag before publishing so subscribers reacting to this
            // outcome can start the next cycle.
            drop(guard);

            let outcome = Arc::new(outcome);
            self.outcome_tx.send_replace(Some(Arc::clone(&outcome)));

            if !(self.rerun.load(Ordering::SeqCst) && self.claim()) {
                return outcome;
            }
        }
    }

    async fn run_once(&self) -> RefreshOutcome {
        let cities = self.registry.read().await.cities().to_vec();
        let state_tx = Arc::clone(&self.state_tx);
        let outcome = self
            .aggregator
            .refresh_observed(&cities, |state| {
                state_tx.send_replace(state);
            })
            .await;

        if outcome.all_failed() {
            tracing::error!(
                cities = outcome.failed.len(),
                "Failed to fetch weather data for every city"
            );
        }
        outcome
    }
}

/// Background task driving a [`RefreshCycle`] on a fixed interval.
#[derive(Debug)]
pub struct RefreshScheduler {
    cycle: RefreshCycle,
    trigger: Arc<Notify>,
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Start the loop. The first cycle runs immediately.
    pub fn start(cycle: RefreshCycle, interval: Duration) -> Self {
        let trigger = Arc::new(Notify::new());
        let stop = Arc::new(Notify::new());

        let handle = tokio::spawn(Self::run_loop(
            cycle.clone(),
            interval,
            Arc::clone(&trigger),
            Arc::clone(&stop),
        ));

        tracing::info!(interval_secs = interval.as_secs(), "Refresh scheduler started");

        Self {
            cycle,
            trigger,
            stop,
            handle,
        }
    }

    async fn run_loop(
        cycle: RefreshCycle,
        interval: Duration,
        trigger: Arc<Notify>,
        stop: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Cycles run detached so a slow one can't delay the timer. Dropping the
        // set aborts whatever is still running.
        let mut cycles = JoinSet::new();

        loop {
            let manual = tokio::select! {
                _ = stop.notified() => break,
                Some(_) = cycles.join_next() => continue,
                _ = ticker.tick() => false,
                _ = trigger.notified() => {
                    tracing::debug!("Manual refresh requested");
                    true
                }
            };

            let cycle = cycle.clone();
            cycles.spawn(async move {
                if manual {
                    cycle.run_or_queue().await;
                } else {
                    cycle.try_run().await;
                }
            });
        }

        cycles.abort_all();
        tracing::info!("Refresh scheduler stopped");
    }

    pub fn cycle(&self) -> &RefreshCycle {
        &self.cycle
    }

    pub fn subscribe(&self) -> watch::Receiver<LatestOutcome> {
        self.cycle.subscribe()
    }

    /// Ask for a cycle now instead of waiting for the next tick. If one is
    /// already running it goes again once it settles.
    pub fn refresh_now(&self) {
        self.trigger.notify_one();
    }

    /// End the loop and abort any cycle still in flight.
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregator::tests::FakeProvider,
        error::WeatherError,
        model::{GeocodingCandidate, Location},
        provider::{ProviderPayload, WeatherProvider},
        registry::CityRegistry,
    };
    use async_trait::async_trait;
    use tokio::{sync::Semaphore, time::timeout};

    const WAIT: Duration = Duration::from_secs(5);

    /// Holds every fetch until a permit is released.
    #[derive(Debug)]
    struct GatedProvider {
        gate: Semaphore,
        inner: FakeProvider,
    }

    #[async_trait]
    impl WeatherProvider for GatedProvider {
        async fn fetch(&self, location: &Location) -> Result<ProviderPayload, WeatherError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| WeatherError::Configuration)?;
            self.inner.fetch(location).await
        }

        async fn search(&self, query: &str) -> Result<Vec<GeocodingCandidate>, WeatherError> {
            self.inner.search(query).await
        }
    }

    fn cycle_with(provider: Arc<dyn WeatherProvider>) -> RefreshCycle {
        RefreshCycle::new(Aggregator::new(provider), CityRegistry::default().into_shared())
    }

    #[tokio::test]
    async fn try_run_publishes_outcome() {
        let cycle = cycle_with(Arc::new(FakeProvider::failing(&[1])));
        let mut rx = cycle.subscribe();

        let outcome = cycle.try_run().await.expect("no cycle in flight");

        assert_eq!(outcome.snapshots.len(), 5);
        assert_eq!(cycle.state(), CycleState::Settled);
        assert!(!cycle.is_in_flight());
        assert!(rx.has_changed().expect("sender alive"));
        let latest = rx.borrow_and_update().clone().expect("outcome published");
        assert_eq!(latest.failed[0].id, 1);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let provider = Arc::new(GatedProvider {
            gate: Semaphore::new(0),
            inner: FakeProvider::default(),
        });
        let cycle = cycle_with(provider.clone());

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.try_run().await }
        });

        let mut state = cycle.subscribe_state();
        timeout(WAIT, state.wait_for(|s| *s == CycleState::Fetching))
            .await
            .expect("cycle started")
            .expect("sender alive");

        assert!(cycle.is_in_flight());
        assert!(cycle.try_run().await.is_none());

        provider.gate.add_permits(CityRegistry::default().len());
        let outcome = timeout(WAIT, first)
            .await
            .expect("cycle finished")
            .expect("task joined")
            .expect("first cycle ran");

        assert_eq!(outcome.snapshots.len(), 6);
        assert!(!cycle.is_in_flight());
        assert!(cycle.try_run().await.is_some());
    }

    #[tokio::test]
    async fn queued_request_reruns_with_edited_registry() {
        let provider = Arc::new(GatedProvider {
            gate: Semaphore::new(0),
            inner: FakeProvider::default(),
        });
        let cycle = cycle_with(provider.clone());

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.try_run().await }
        });

        let mut state = cycle.subscribe_state();
        timeout(WAIT, state.wait_for(|s| *s == CycleState::Fetching))
            .await
            .expect("cycle started")
            .expect("sender alive");

        // London (id 2) becomes Berlin after the running cycle read the list.
        cycle
            .registry()
            .write()
            .await
            .replace(2, Location::new(0, "Berlin", "DE", 52.52, 13.405))
            .expect("London is registered");
        assert!(cycle.run_or_queue().await.is_none());

        provider.gate.add_permits(CityRegistry::default().len());
        let outcome = timeout(WAIT, first)
            .await
            .expect("cycle finished")
            .expect("task joined")
            .expect("first cycle ran");

        assert_eq!(outcome.snapshots[&2].current.feels_like, 53);
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 12);
        assert!(!cycle.is_in_flight());

        let latest = cycle.latest().expect("outcome published");
        assert_eq!(latest.snapshots[&2].current.feels_like, 53);
    }

    #[tokio::test]
    async fn plain_try_run_does_not_queue() {
        let provider = Arc::new(GatedProvider {
            gate: Semaphore::new(0),
            inner: FakeProvider::default(),
        });
        let cycle = cycle_with(provider.clone());

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.try_run().await }
        });

        let mut state = cycle.subscribe_state();
        timeout(WAIT, state.wait_for(|s| *s == CycleState::Fetching))
            .await
            .expect("cycle started")
            .expect("sender alive");
        assert!(cycle.try_run().await.is_none());

        provider.gate.add_permits(CityRegistry::default().len());
        timeout(WAIT, first)
            .await
            .expect("cycle finished")
            .expect("task joined")
            .expect("first cycle ran");

        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn stop_aborts_cycle_in_flight() {
        let provider = Arc::new(GatedProvider {
            gate: Semaphore::new(0),
            inner: FakeProvider::default(),
        });
        let cycle = cycle_with(provider.clone());
        let scheduler = RefreshScheduler::start(cycle.clone(), Duration::from_secs(3600));

        let mut state = cycle.subscribe_state();
        timeout(WAIT, state.wait_for(|s| *s == CycleState::Fetching))
            .await
            .expect("startup cycle started")
            .expect("sender alive");
        assert!(cycle.is_in_flight());

        scheduler.stop();
        timeout(WAIT, async {
            while !scheduler.is_finished() || cycle.is_in_flight() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("cycle aborted");

        provider.gate.add_permits(CityRegistry::default().len());
        tokio::task::yield_now().await;
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 0);
        assert!(cycle.latest().is_none());
    }

    #[tokio::test]
    async fn scheduler_runs_at_startup_and_on_demand() {
        let provider = Arc::new(FakeProvider::default());
        let cycle = cycle_with(provider.clone());
        let scheduler = RefreshScheduler::start(cycle, Duration::from_secs(3600));
        let mut rx = scheduler.subscribe();

        timeout(WAIT, rx.wait_for(|o| o.is_some()))
            .await
            .expect("startup cycle")
            .expect("sender alive");
        let calls_after_startup = provider.calls.load(Ordering::SeqCst);
        assert_eq!(calls_after_startup, 6);

        drop(rx.borrow_and_update());
        scheduler.refresh_now();
        timeout(WAIT, rx.changed())
            .await
            .expect("manual cycle")
            .expect("sender alive");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 12);

        scheduler.stop();
        timeout(WAIT, async {
            while !scheduler.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("scheduler stopped");
    }
}
