//! Composition root.
//!
//! Wires the reconcile service, the boost machine and the screen
//! controllers together, owns every long-lived task, and tears all of them
//! down on shutdown. The host (render surface) holds the command receiver
//! and calls back into the screens for user actions.

use crate::{
    boost::machine::{ActivationOutcome, BoostMachine},
    boost::zones::generate_zones,
    core::{config::AppConfig, geo::LatLng},
    reconcile::{FetchFeed, MergedView, ReconcileService},
    screen::{
        boost::BoostScreen,
        map::{MapCommand, MapScreen},
    },
    sources::{manual::ManualPointSource, profile::ProfileStore},
    storage::KeyValueStore,
};
use chrono::Utc;
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

pub struct HotzoneApp<S: KeyValueStore + 'static> {
    pub map: Arc<Mutex<MapScreen>>,
    pub boost: Arc<Mutex<BoostScreen<S>>>,
    config: AppConfig,
    profiles: Arc<dyn ProfileStore>,
    reconcile: ReconcileService,
    commands: Receiver<MapCommand>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: KeyValueStore + 'static> HotzoneApp<S> {
    /// Restores durable state, spawns the reconcile loop, the one-second
    /// boost countdown and the reward zone regeneration, and starts watching
    /// the remote profile record when one is already registered.
    pub async fn start(
        config: AppConfig,
        manual: Arc<dyn ManualPointSource>,
        profiles: Arc<dyn ProfileStore>,
        fetcher: impl FetchFeed,
        store: S,
    ) -> Self {
        let machine = BoostMachine::restore(store, config.boost_duration, Utc::now());
        let boost = Arc::new(Mutex::new(BoostScreen::new(machine)));

        let (map_screen, commands) = MapScreen::new(&config);
        let map = Arc::new(Mutex::new(map_screen));

        let reconcile = ReconcileService::start(manual.as_ref(), fetcher, &config).await;

        let mut app = Self {
            map,
            boost,
            config,
            profiles,
            reconcile,
            commands,
            tasks: Vec::new(),
        };

        app.spawn_view_forwarder();
        app.spawn_countdown();
        app.spawn_zone_regeneration();

        let existing_profile = app.boost.lock().expect("boost lock poisoned").profile_id();
        if let Some(id) = existing_profile {
            app.watch_profile(id);
        }

        app
    }

    /// Commands for the render surface (fly-to, popup, notices)
    pub fn commands(&self) -> Receiver<MapCommand> {
        self.commands.clone()
    }

    /// Current and future reconciled views
    pub fn view(&self) -> watch::Receiver<MergedView> {
        self.reconcile.view()
    }

    /// Fed by the host's watch-mode geolocation stream
    pub fn set_user_position(&self, position: Option<LatLng>) {
        self.map
            .lock()
            .expect("map lock poisoned")
            .set_user_position(position);
    }

    /// Flush deferred screen actions (popup-after-settle)
    pub fn pump(&self, now: instant::Instant) {
        self.map.lock().expect("map lock poisoned").pump(now);
    }

    /// User pressed the boost toggle. When activation proceeds, the fixed
    /// provisioning delay runs detached and cannot be canceled.
    pub fn activate_boost(&mut self) -> ActivationOutcome {
        let outcome = self
            .boost
            .lock()
            .expect("boost lock poisoned")
            .request_activation();

        if outcome == ActivationOutcome::Provisioning {
            let boost = self.boost.clone();
            let delay = self.config.provisioning_delay;
            self.tasks.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut screen = boost.lock().expect("boost lock poisoned");
                if let Err(err) = screen.finish_activation(Utc::now()) {
                    log::warn!("failed to persist boost activation: {err}");
                }
            }));
        }
        outcome
    }

    /// Watches the remote profile record and forces boost off when it
    /// disappears. Called automatically at startup for an existing profile
    /// and by the host right after a successful registration.
    pub fn watch_profile(&mut self, id: String) {
        let profiles = self.profiles.clone();
        let boost = self.boost.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rx = profiles.subscribe(&id).await;
            let mut existed = rx.borrow().is_some();
            while rx.changed().await.is_ok() {
                let present = rx.borrow().is_some();
                if existed && !present {
                    boost
                        .lock()
                        .expect("boost lock poisoned")
                        .on_profile_deleted();
                }
                existed = present;
            }
        }));
    }

    /// Releases every subscription, interval and in-flight task
    pub fn shutdown(&mut self) {
        self.reconcile.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn spawn_view_forwarder(&mut self) {
        let map = self.map.clone();
        let mut view_rx = self.reconcile.view();
        self.tasks.push(tokio::spawn(async move {
            while view_rx.changed().await.is_ok() {
                let view = view_rx.borrow().clone();
                map.lock().expect("map lock poisoned").apply_view(view);
            }
        }));
    }

    fn spawn_countdown(&mut self) {
        let boost = self.boost.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(COUNTDOWN_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                boost.lock().expect("boost lock poisoned").tick(Utc::now());
            }
        }));
    }

    fn spawn_zone_regeneration(&mut self) {
        let boost = self.boost.clone();
        let map = self.map.clone();
        let period = self.config.zone_interval;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let active = {
                    let screen = boost.lock().expect("boost lock poisoned");
                    screen.status() == crate::boost::machine::BoostStatus::On
                };
                let mut map = map.lock().expect("map lock poisoned");
                if active {
                    let center = map.user_position();
                    let zones = generate_zones(center, &mut rand::thread_rng());
                    map.set_zones(zones);
                } else if !map.zones().is_empty() {
                    map.set_zones(Vec::new());
                }
            }
        }));
    }
}

impl<S: KeyValueStore + 'static> Drop for HotzoneApp<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
