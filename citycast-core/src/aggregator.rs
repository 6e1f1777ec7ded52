//! One refresh cycle across every registered city.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::{
    error::WeatherError,
    model::{Location, LocationId, SnapshotMap, WeatherSnapshot},
    normalizer,
    provider::WeatherProvider,
    registry::SharedRegistry,
};

/// Where a refresh cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    /// Requests for every city are in flight.
    Fetching,
    /// At least one city has answered; results are merged as they arrive.
    Merging,
    Settled,
}

/// A city that produced no snapshot this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedLocation {
    pub id: LocationId,
    pub name: String,
    pub reason: String,
}

/// Result of a cycle: the fresh snapshot map plus the cities missing from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    pub snapshots: SnapshotMap,
    pub failed: Vec<FailedLocation>,
    /// Forecast samples dropped by the normalizer across all cities.
    pub skipped_samples: usize,
}

impl RefreshOutcome {
    /// Every city failed. An empty registry does not count.
    pub fn all_failed(&self) -> bool {
        self.snapshots.is_empty() && !self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    provider: Arc<dyn WeatherProvider>,
}

impl Aggregator {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn WeatherProvider> {
        &self.provider
    }

    async fn snapshot_for(
        &self,
        location: &Location,
    ) -> Result<(WeatherSnapshot, usize), WeatherError> {
        let payload = self.provider.fetch(location).await?;
        let report = normalizer::normalize_value(&payload.forecast);

        let snapshot = WeatherSnapshot {
            current: payload.current,
            daily: report.summaries,
        };
        Ok((snapshot, report.skipped))
    }

    /// Fetch every location concurrently and keep whichever succeeded. A
    /// failing city is logged and listed in `failed`; it never affects the
    /// others.
    pub async fn refresh(&self, locations: &[Location]) -> RefreshOutcome {
        self.refresh_observed(locations, |_| {}).await
    }

    /// Same as [`Aggregator::refresh`], reporting each state change to `observe`.
    pub async fn refresh_observed(
        &self,
        locations: &[Location],
        mut observe: impl FnMut(CycleState),
    ) -> RefreshOutcome {
        let mut pending: FuturesUnordered<_> = locations
            .iter()
            .map(|location| async move { (location, self.snapshot_for(location).await) })
            .collect();

        let mut outcome = RefreshOutcome::default();
        observe(CycleState::Fetching);

        while let Some((location, result)) = pending.next().await {
            if outcome.snapshots.is_empty() && outcome.failed.is_empty() {
                observe(CycleState::Merging);
            }

            match result {
                Ok((snapshot, skipped)) => {
                    outcome.skipped_samples += skipped;
                    outcome.snapshots.insert(location.id, snapshot);
                }
                Err(e) => {
                    tracing::warn!(
                        city_id = location.id,
                        city = %location.name,
                        error = %e,
                        "Failed to fetch weather"
                    );
                    outcome.failed.push(FailedLocation {
                        id: location.id,
                        name: location.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Arrival order is arbitrary; report failures in registry order.
        outcome
            .failed
            .sort_by_key(|f| locations.iter().position(|l| l.id == f.id));

        tracing::info!(
            fetched = outcome.snapshots.len(),
            failed = outcome.failed.len(),
            skipped_samples = outcome.skipped_samples,
            "Refresh cycle settled"
        );
        observe(CycleState::Settled);

        outcome
    }

    /// Refresh against the registry's current city list. The lock is only held
    /// while the list is copied.
    pub async fn refresh_registry(&self, registry: &SharedRegistry) -> RefreshOutcome {
        let cities = registry.read().await.cities().to_vec();
        self.refresh(&cities).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        error::Endpoint,
        model::{CurrentConditions, GeocodingCandidate},
        provider::ProviderPayload,
        registry::{CityRegistry, default_cities},
    };
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Provider that fails for a fixed set of city ids.
    #[derive(Debug, Default)]
    pub(crate) struct FakeProvider {
        pub failing: HashSet<LocationId>,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub(crate) fn failing(ids: &[LocationId]) -> Self {
            Self {
                failing: ids.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn fetch(&self, location: &Location) -> Result<ProviderPayload, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.failing.contains(&location.id) {
                return Err(WeatherError::Status {
                    endpoint: Endpoint::Forecast,
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "boom".into(),
                });
            }

            Ok(ProviderPayload {
                current: CurrentConditions {
                    temperature: location.id as i32,
                    // Tells apart two places that shared an id.
                    feels_like: location.coordinates.lat.round() as i32,
                    condition: "Clear".into(),
                    icon: "01d".into(),
                    humidity: 40,
                    wind_speed_kmh: 36,
                    sunrise: 1_709_265_600,
                    sunset: 1_709_308_800,
                },
                forecast: json!([
                    { "dt": 1_709_280_000, "main": { "temp_min": 10.0, "temp_max": 20.0 },
                      "weather": [{ "main": "Clear", "icon": "01d" }] },
                    { "dt": 1_709_290_800, "main": { "temp_min": 8.0 },
                      "weather": [{ "main": "Rain", "icon": "10d" }] }
                ]),
            })
        }

        async fn search(&self, _query: &str) -> Result<Vec<GeocodingCandidate>, WeatherError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn one_failure_leaves_the_rest() {
        let provider = Arc::new(FakeProvider::failing(&[3]));
        let aggregator = Aggregator::new(provider.clone());
        let cities = default_cities();

        let outcome = aggregator.refresh(&cities).await;

        assert_eq!(outcome.snapshots.len(), cities.len() - 1);
        assert!(!outcome.snapshots.contains_key(&3));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, 3);
        assert_eq!(outcome.failed[0].name, "Tokyo");
        assert!(!outcome.all_failed());
        assert_eq!(outcome.skipped_samples, cities.len() - 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), cities.len());
    }

    #[tokio::test]
    async fn snapshot_carries_current_and_daily() {
        let aggregator = Aggregator::new(Arc::new(FakeProvider::default()));
        let cities = default_cities();

        let outcome = aggregator.refresh(&cities[..1]).await;
        let snapshot = &outcome.snapshots[&1];

        assert_eq!(snapshot.current.temperature, 1);
        assert_eq!(snapshot.daily.len(), 1);
        assert_eq!((snapshot.daily[0].min, snapshot.daily[0].max), (10, 20));
    }

    #[tokio::test]
    async fn all_failing_is_distinct_from_no_cities() {
        let ids: Vec<_> = default_cities().iter().map(|c| c.id).collect();
        let aggregator = Aggregator::new(Arc::new(FakeProvider::failing(&ids)));

        let outcome = aggregator.refresh(&default_cities()).await;
        assert!(outcome.snapshots.is_empty());
        assert!(outcome.all_failed());

        let outcome = aggregator.refresh(&[]).await;
        assert!(outcome.snapshots.is_empty());
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn refresh_registry_reads_current_list() {
        let registry = CityRegistry::default().into_shared();
        registry
            .write()
            .await
            .replace(1, Location::new(0, "Berlin", "DE", 52.52, 13.405))
            .expect("Algiers is registered");
        registry.write().await.remove(6).expect("Paris is registered");

        let aggregator = Aggregator::new(Arc::new(FakeProvider::default()));
        let outcome = aggregator.refresh_registry(&registry).await;

        let mut ids: Vec<_> = outcome.snapshots.keys().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn observer_sees_each_state_once() {
        let aggregator = Aggregator::new(Arc::new(FakeProvider::failing(&[2])));
        let mut states = Vec::new();

        aggregator
            .refresh_observed(&default_cities(), |s| states.push(s))
            .await;

        assert_eq!(
            states,
            vec![CycleState::Fetching, CycleState::Merging, CycleState::Settled]
        );
    }

    #[tokio::test]
    async fn failures_listed_in_registry_order() {
        let aggregator = Aggregator::new(Arc::new(FakeProvider::failing(&[5, 2, 4])));

        let outcome = aggregator.refresh(&default_cities()).await;
        let ids: Vec<_> = outcome.failed.iter().map(|f| f.id).collect();

        assert_eq!(ids, vec![2, 4, 5]);
    }
}
