//! Live map data reconciliation.
//!
//! Merges two asynchronously-arriving sources into one render-ready model:
//! the push-delivered manual point snapshots and the polled event/vehicle
//! feed. The merged view is derived, never incrementally patched; every
//! manual-source change (and the optional time-based refresh) re-fetches the
//! feed and recombines from scratch.

use crate::{
    core::config::{AppConfig, CityFilter},
    data::{
        point::{GeoPoint, HeatPoint, PointKey},
        vehicle::Vehicle,
    },
    sources::{
        feed::{FeedClient, FeedSnapshot, FeedTaxi},
        manual::{ManualPointSource, ManualRecord},
    },
    Result,
};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One reconciled render-ready snapshot
#[derive(Debug, Clone, Default)]
pub struct MergedView {
    pub points: Vec<GeoPoint>,
    pub vehicles: Vec<Vehicle>,
    /// Reconciliation cycle that produced this view; strictly increasing
    pub generation: u64,
}

impl MergedView {
    /// Numeric heatmap input: every point whose coordinates failed coercion
    /// is excluded here, regardless of its presence in list views.
    pub fn heat_points(&self) -> Vec<HeatPoint> {
        self.points.iter().filter_map(HeatPoint::from_point).collect()
    }

    /// Marker set: only points that can actually be placed on the map
    pub fn renderable_points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.points.iter().filter(|p| p.is_renderable())
    }
}

fn city_matches(record_city: Option<&str>, active: &str, filter: CityFilter) -> bool {
    match record_city {
        Some(city) => city.eq_ignore_ascii_case(active),
        None => matches!(filter, CityFilter::IncludeUntagged),
    }
}

/// Merges one manual snapshot with one feed poll result.
///
/// Manual points come first, then feed events; at most one entry per
/// `(source, id)` pair survives. A failed feed poll (`feed == None`) yields
/// the manual-only list exactly.
pub fn merge(
    manual: &[ManualRecord],
    feed: Option<&FeedSnapshot>,
    active_city: &str,
    filter: CityFilter,
) -> MergedView {
    let mut seen: HashSet<PointKey> = HashSet::new();
    let mut points = Vec::new();

    for record in manual {
        if !city_matches(record.city.as_deref(), active_city, filter) {
            continue;
        }
        let point = record.clone().into_point();
        if seen.insert(point.key()) {
            points.push(point);
        }
    }

    let mut vehicles = Vec::new();
    if let Some(feed) = feed {
        for event in &feed.events {
            if !city_matches(event.city.as_deref(), active_city, filter) {
                continue;
            }
            let point = event.clone().into_point();
            if seen.insert(point.key()) {
                points.push(point);
            }
        }
        vehicles = feed
            .taxis
            .iter()
            .cloned()
            .filter_map(FeedTaxi::into_vehicle)
            .collect();
    }

    MergedView {
        points,
        vehicles,
        generation: 0,
    }
}

/// Abstraction over the feed fetch so the service can be driven in tests
/// without a live endpoint.
pub trait FetchFeed: Send + Sync + 'static {
    fn fetch(&self, city: Option<String>) -> BoxFuture<'static, Result<FeedSnapshot>>;
}

impl FetchFeed for FeedClient {
    fn fetch(&self, city: Option<String>) -> BoxFuture<'static, Result<FeedSnapshot>> {
        let client = self.clone();
        Box::pin(async move { client.fetch(city.as_deref()).await })
    }
}

type CycleDone = (u64, Vec<ManualRecord>, Option<FeedSnapshot>);

/// Long-lived reconciliation task.
///
/// Publishes a fresh [`MergedView`] through a watch channel on every
/// completed cycle. Cycles are stamped with a monotonic generation; a slow
/// feed response that completes after a newer cycle has started is discarded,
/// so the published view only ever reflects the most recently started
/// reconciliation.
pub struct ReconcileService {
    view_rx: watch::Receiver<MergedView>,
    handle: JoinHandle<()>,
}

impl ReconcileService {
    /// Subscribes to the manual source and spawns the reconcile loop
    pub async fn start(
        source: &dyn ManualPointSource,
        fetcher: impl FetchFeed,
        config: &AppConfig,
    ) -> Self {
        let manual_rx = source.subscribe().await;
        Self::spawn(manual_rx, fetcher, config)
    }

    /// Spawns the loop over an already-open manual subscription
    pub fn spawn(
        manual_rx: mpsc::UnboundedReceiver<Vec<ManualRecord>>,
        fetcher: impl FetchFeed,
        config: &AppConfig,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(MergedView::default());
        let city = config.city.clone();
        let filter = config.city_filter;
        let refresh = config.refresh_interval;
        let handle = tokio::spawn(run(manual_rx, fetcher, city, filter, refresh, view_tx));
        Self { view_rx, handle }
    }

    /// Current and future merged views
    pub fn view(&self) -> watch::Receiver<MergedView> {
        self.view_rx.clone()
    }

    /// Tears the reconcile loop down, releasing the manual subscription
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ReconcileService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    mut manual_rx: mpsc::UnboundedReceiver<Vec<ManualRecord>>,
    fetcher: impl FetchFeed,
    city: String,
    filter: CityFilter,
    refresh: Option<Duration>,
    view_tx: watch::Sender<MergedView>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<CycleDone>();
    let mut latest_manual: Vec<ManualRecord> = Vec::new();
    let mut current_gen: u64 = 0;
    let mut seen_first_snapshot = false;

    // A disabled refresh still needs an interval for the select arm; make it
    // effectively never fire.
    let period = refresh.unwrap_or(Duration::from_secs(60 * 60 * 24 * 365));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            snapshot = manual_rx.recv() => {
                let Some(snapshot) = snapshot else {
                    log::debug!("manual subscription closed, stopping reconciliation");
                    break;
                };
                latest_manual = snapshot;
                seen_first_snapshot = true;
                current_gen += 1;
                start_cycle(&fetcher, &city, current_gen, latest_manual.clone(), done_tx.clone());
            }
            _ = ticker.tick(), if refresh.is_some() && seen_first_snapshot => {
                current_gen += 1;
                start_cycle(&fetcher, &city, current_gen, latest_manual.clone(), done_tx.clone());
            }
            Some((generation, manual, feed)) = done_rx.recv() => {
                if generation != current_gen {
                    log::debug!(
                        "discarding stale reconciliation result (generation {generation}, current {current_gen})"
                    );
                    continue;
                }
                let mut view = merge(&manual, feed.as_ref(), &city, filter);
                view.generation = generation;
                log::debug!(
                    "publishing generation {generation}: {} points, {} vehicles",
                    view.points.len(),
                    view.vehicles.len()
                );
                let _ = view_tx.send(view);
            }
        }
    }
}

fn start_cycle(
    fetcher: &impl FetchFeed,
    city: &str,
    generation: u64,
    manual: Vec<ManualRecord>,
    done_tx: mpsc::UnboundedSender<CycleDone>,
) {
    let fetch = fetcher.fetch(Some(city.to_string()));
    tokio::spawn(async move {
        let feed = match fetch.await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                // Non-fatal: the cycle still publishes the manual-only list
                log::warn!("feed poll failed, degrading to manual-only data: {err}");
                None
            }
        };
        let _ = done_tx.send((generation, manual, feed));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::feed::FeedEvent;
    use serde_json::json;
    use std::sync::Arc;

    fn manual_record(id: &str, lat: impl Into<serde_json::Value>, city: Option<&str>) -> ManualRecord {
        serde_json::from_value(json!({
            "id": id,
            "label": format!("spot {id}"),
            "lat": lat.into(),
            "lng": 37.6,
            "city": city,
        }))
        .unwrap()
    }

    fn feed_event(id: &str) -> FeedEvent {
        serde_json::from_value(json!({
            "_id": id, "lat": 55.7, "lng": 37.6, "title": format!("event {id}")
        }))
        .unwrap()
    }

    #[test]
    fn test_failed_feed_yields_manual_only() {
        let manual = vec![manual_record("a", 55.7, None), manual_record("b", 55.8, None)];
        let view = merge(&manual, None, "moscow", CityFilter::IncludeUntagged);

        assert_eq!(view.points.len(), 2);
        assert!(view.vehicles.is_empty());
        assert!(view.points.iter().all(|p| p.source == crate::PointSource::Manual));
    }

    #[test]
    fn test_coercion_failures_excluded_from_heat_input() {
        let manual = vec![manual_record("ok", 55.7, None), manual_record("bad", "abc", None)];
        let view = merge(&manual, None, "moscow", CityFilter::IncludeUntagged);

        // Both points are listed, only one feeds the heatmap
        assert_eq!(view.points.len(), 2);
        let heat = view.heat_points();
        assert_eq!(heat.len(), 1);
        assert!(heat.iter().all(|h| h.lat.is_finite() && h.lng.is_finite()));
    }

    #[test]
    fn test_dedup_is_per_source() {
        let manual = vec![manual_record("x", 55.7, None), manual_record("x", 55.8, None)];
        let feed = FeedSnapshot {
            events: vec![feed_event("x")],
            taxis: Vec::new(),
        };
        let view = merge(&manual, Some(&feed), "moscow", CityFilter::IncludeUntagged);

        // Duplicate manual id collapses, but the feed point with the same id
        // survives because identity is (source, id).
        assert_eq!(view.points.len(), 2);
    }

    #[test]
    fn test_city_filter_modes() {
        let manual = vec![
            manual_record("tagged", 55.7, Some("moscow")),
            manual_record("other", 55.7, Some("kazan")),
            manual_record("untagged", 55.7, None),
        ];

        let inclusive = merge(&manual, None, "moscow", CityFilter::IncludeUntagged);
        assert_eq!(inclusive.points.len(), 2);

        let strict = merge(&manual, None, "moscow", CityFilter::Strict);
        assert_eq!(strict.points.len(), 1);
        assert_eq!(strict.points[0].id, "tagged");
    }

    struct SlowThenFastFeed {
        delay_ms: std::sync::atomic::AtomicU64,
    }

    impl FetchFeed for Arc<SlowThenFastFeed> {
        fn fetch(&self, _city: Option<String>) -> BoxFuture<'static, Result<FeedSnapshot>> {
            // First call is slow and returns one event; later calls are fast
            // and return two. The slow response must never win.
            let delay = self
                .delay_ms
                .swap(0, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let count = if delay > 0 { 1 } else { 2 };
                Ok(FeedSnapshot {
                    events: (0..count)
                        .map(|i| {
                            serde_json::from_value(json!({
                                "_id": format!("e{i}"), "lat": 55.7, "lng": 37.6
                            }))
                            .unwrap()
                        })
                        .collect(),
                    taxis: Vec::new(),
                })
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_feed_response_is_discarded() {
        let fetcher = Arc::new(SlowThenFastFeed {
            delay_ms: std::sync::atomic::AtomicU64::new(5_000),
        });
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        let config = AppConfig {
            refresh_interval: None,
            ..AppConfig::default()
        };
        let service = ReconcileService::spawn(manual_rx, fetcher, &config);
        let mut view_rx = service.view();

        // First push starts the slow cycle, second push supersedes it
        manual_tx.send(vec![]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manual_tx.send(vec![]).unwrap();

        // Let both in-flight fetches complete
        tokio::time::sleep(Duration::from_secs(10)).await;

        view_rx
            .wait_for(|view| view.generation > 0)
            .await
            .unwrap();
        let view = view_rx.borrow().clone();
        assert_eq!(view.generation, 2);
        assert_eq!(view.points.len(), 2, "slow first response must not win");
    }

    struct CountingFeed {
        calls: Arc<std::sync::atomic::AtomicU64>,
    }

    impl FetchFeed for CountingFeed {
        fn fetch(&self, _city: Option<String>) -> BoxFuture<'static, Result<FeedSnapshot>> {
            // Each poll returns a single event tagged with the call number
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Box::pin(async move {
                Ok(FeedSnapshot {
                    events: vec![serde_json::from_value(json!({
                        "_id": format!("poll-{call}"), "lat": 55.7, "lng": 37.6
                    }))
                    .unwrap()],
                    taxis: Vec::new(),
                })
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_interval_repolls_without_manual_push() {
        let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let fetcher = CountingFeed {
            calls: calls.clone(),
        };
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        let config = AppConfig {
            refresh_interval: Some(Duration::from_millis(100)),
            ..AppConfig::default()
        };
        let service = ReconcileService::spawn(manual_rx, fetcher, &config);
        let mut view_rx = service.view();

        manual_tx.send(vec![]).unwrap();
        view_rx.wait_for(|view| view.generation == 1).await.unwrap();
        assert_eq!(view_rx.borrow().points[0].id, "poll-1");

        // No further manual pushes: the interval re-polls on its own and the
        // refreshed feed result is published.
        let view = view_rx
            .wait_for(|view| view.generation >= 2)
            .await
            .unwrap()
            .clone();
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
        assert_eq!(view.points.len(), 1);
        assert_ne!(view.points[0].id, "poll-1", "stale poll result republished");
    }

    struct FailingFeed;

    impl FetchFeed for FailingFeed {
        fn fetch(&self, _city: Option<String>) -> BoxFuture<'static, Result<FeedSnapshot>> {
            Box::pin(async {
                Err(crate::HotzoneError::Storage("boom".into()).into())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_failure_still_publishes_manual_list() {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        let config = AppConfig {
            refresh_interval: None,
            ..AppConfig::default()
        };
        let service = ReconcileService::spawn(manual_rx, FailingFeed, &config);
        let mut view_rx = service.view();

        manual_tx
            .send(vec![manual_record("a", 55.7, None)])
            .unwrap();

        view_rx.wait_for(|view| view.generation == 1).await.unwrap();
        let view = view_rx.borrow().clone();
        assert_eq!(view.points.len(), 1);
        assert_eq!(view.points[0].id, "a");
        assert!(view.vehicles.is_empty());
    }
}
