//! Map screen view controller.
//!
//! Owns the UI state of the map screen (merged view, search, selection,
//! panel/modal flags, tracked user position, reward zones) and issues
//! commands to the external render surface. Presentation itself lives
//! outside this crate; the render layer consumes [`MapCommand`]s and feeds
//! back click/select events by calling the methods here.

use crate::{
    boost::zones::RewardZone,
    core::{config::AppConfig, geo::LatLng},
    data::point::{GeoPoint, PointKey},
    navigate,
    reconcile::MergedView,
    sources::manual::{ManualPointSource, NewPoint},
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use instant::Instant;
use std::time::Duration;

/// Zoom used when jumping to a selected point
pub const POINT_ZOOM: f64 = 16.0;
/// Zoom used for the locate-me action
pub const LOCATE_ZOOM: f64 = 14.0;
/// How many points the recommended shelf shows
pub const RECOMMENDED_COUNT: usize = 5;

/// Commands consumed by the render surface
#[derive(Debug, Clone, PartialEq)]
pub enum MapCommand {
    /// Animate the viewport to the target
    FlyTo {
        target: LatLng,
        zoom: f64,
        key: Option<PointKey>,
    },
    /// Open the detail callout for a point; emitted after the settle delay
    OpenPopup { key: PointKey },
    /// Blocking user-visible notification (write failures and the like)
    Notify { message: String },
}

pub struct MapScreen {
    view: MergedView,
    zones: Vec<RewardZone>,
    query: String,
    pub panel_collapsed: bool,
    pub modal_open: bool,
    pub search_open: bool,
    user_position: Option<LatLng>,
    pending_popup: Option<(PointKey, Instant)>,
    settle_delay: Duration,
    commands: Sender<MapCommand>,
}

impl MapScreen {
    /// Creates the screen and the command channel the render surface reads
    pub fn new(config: &AppConfig) -> (Self, Receiver<MapCommand>) {
        let (tx, rx) = unbounded();
        let screen = Self {
            view: MergedView::default(),
            zones: Vec::new(),
            query: String::new(),
            panel_collapsed: false,
            modal_open: false,
            search_open: false,
            user_position: None,
            pending_popup: None,
            settle_delay: config.settle_delay,
            commands: tx,
        };
        (screen, rx)
    }

    /// Replaces the rendered model with a freshly reconciled view
    pub fn apply_view(&mut self, view: MergedView) {
        self.view = view;
    }

    pub fn view(&self) -> &MergedView {
        &self.view
    }

    /// Current reward zone overlay; empty unless boost is active
    pub fn zones(&self) -> &[RewardZone] {
        &self.zones
    }

    pub fn set_zones(&mut self, zones: Vec<RewardZone>) {
        self.zones = zones;
    }

    /// Updated by the host's geolocation watch stream
    pub fn set_user_position(&mut self, position: Option<LatLng>) {
        self.user_position = position;
    }

    pub fn user_position(&self) -> Option<LatLng> {
        self.user_position
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Case-insensitive substring search over point labels
    pub fn search_results(&self) -> Vec<&GeoPoint> {
        let needle = self.query.to_lowercase();
        self.view
            .points
            .iter()
            .filter(|p| p.label.to_lowercase().contains(&needle))
            .collect()
    }

    /// The quick-access shelf: first few points of the merged list
    pub fn recommended(&self) -> &[GeoPoint] {
        let n = self.view.points.len().min(RECOMMENDED_COUNT);
        &self.view.points[..n]
    }

    /// Handles a click on a point (marker, shelf card or search result).
    ///
    /// Emits a fly-to immediately and schedules the detail callout to open
    /// after the settle delay. Points without usable coordinates are
    /// non-navigable: selecting them does nothing beyond closing the search.
    pub fn select_point(&mut self, key: &PointKey, now: Instant) {
        self.search_open = false;
        self.panel_collapsed = true;

        let Some(point) = self.view.points.iter().find(|p| &p.key() == key) else {
            return;
        };
        let Some(target) = point.position.filter(|p| p.is_valid()) else {
            log::debug!("ignoring selection of non-renderable point {:?}", key);
            return;
        };

        let _ = self.commands.send(MapCommand::FlyTo {
            target,
            zoom: POINT_ZOOM,
            key: Some(key.clone()),
        });
        self.pending_popup = Some((key.clone(), now + self.settle_delay));
    }

    /// Flushes due deferred actions; the host calls this on its frame/timer
    /// cadence.
    pub fn pump(&mut self, now: Instant) {
        if let Some((key, due)) = self.pending_popup.take() {
            if now >= due {
                let _ = self.commands.send(MapCommand::OpenPopup { key });
            } else {
                self.pending_popup = Some((key, due));
            }
        }
    }

    /// Jump to the tracked device position, when known
    pub fn locate_me(&mut self) {
        if let Some(target) = self.user_position {
            let _ = self.commands.send(MapCommand::FlyTo {
                target,
                zoom: LOCATE_ZOOM,
                key: None,
            });
        }
    }

    /// Submits the point-creation form.
    ///
    /// Failures (bad coordinates, store rejection) surface as a blocking
    /// notification and keep the modal open; nothing is retried.
    pub async fn submit_point(&mut self, source: &dyn ManualPointSource, form: NewPoint) {
        match source.add_point(form).await {
            Ok(id) => {
                log::debug!("created manual point {id}");
                self.modal_open = false;
            }
            Err(err) => {
                let _ = self.commands.send(MapCommand::Notify {
                    message: format!("Could not save the point: {err}"),
                });
            }
        }
    }

    /// Deep link for the "go" button on a point callout; uses the tracked
    /// position as origin when geolocation is available.
    pub fn route_url(&self, dest: LatLng) -> String {
        navigate::navigation_url(dest, self.user_position)
    }
}
