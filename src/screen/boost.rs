//! Boost screen view controller.
//!
//! Wraps the state machine with the user-facing flow: terms agreement, the
//! registration sub-flow, coefficient selection and blocking notices. The
//! provisioning delay and the one-second countdown are driven by the
//! composition root; this type only holds screen state and transitions.

use crate::{
    boost::machine::{ActivationOutcome, BoostMachine, BoostStatus, Coefficient},
    sources::profile::{DriverProfile, ProfileStore},
    storage::KeyValueStore,
    Result,
};
use chrono::{DateTime, Utc};

pub struct BoostScreen<S: KeyValueStore> {
    machine: BoostMachine<S>,
    pub agreed: bool,
    pub registration_open: bool,
    /// Blocking notification text, cleared by the user dismissing it
    pub notice: Option<String>,
}

impl<S: KeyValueStore> BoostScreen<S> {
    pub fn new(machine: BoostMachine<S>) -> Self {
        Self {
            machine,
            agreed: false,
            registration_open: false,
            notice: None,
        }
    }

    pub fn status(&self) -> BoostStatus {
        self.machine.status()
    }

    pub fn coefficient(&self) -> Coefficient {
        self.machine.coefficient()
    }

    pub fn set_coefficient(&mut self, coefficient: Coefficient) {
        self.machine.set_coefficient(coefficient);
    }

    pub fn set_agreed(&mut self, agreed: bool) {
        self.agreed = agreed;
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Id of the remote profile record this screen watches, if registered
    pub fn profile_id(&self) -> Option<String> {
        self.machine.profile().map(|p| p.id.clone())
    }

    /// The user pressed the activation toggle while off.
    ///
    /// Failing the agreement guard shows a prompt; a missing profile opens
    /// the registration sub-flow instead of proceeding.
    pub fn request_activation(&mut self) -> ActivationOutcome {
        let outcome = self.machine.begin_activation(self.agreed);
        match outcome {
            ActivationOutcome::NeedsAgreement => {
                self.notice = Some("Accept the terms to enable boost".to_string());
            }
            ActivationOutcome::NeedsRegistration => {
                self.registration_open = true;
            }
            ActivationOutcome::Provisioning => {}
            ActivationOutcome::AlreadyActive => {}
        }
        outcome
    }

    /// Registration sub-flow: persists the profile remotely, then locally.
    /// On success activation may be retried by the user; on failure a
    /// blocking notice is shown and nothing is retried automatically.
    pub async fn register(
        &mut self,
        store: &dyn ProfileStore,
        profile: DriverProfile,
    ) -> Result<String> {
        match store.create(profile.clone()).await {
            Ok(id) => {
                self.machine.set_profile(id.clone(), profile)?;
                self.registration_open = false;
                Ok(id)
            }
            Err(err) => {
                self.notice = Some(format!("Registration failed: {err}"));
                Err(err)
            }
        }
    }

    /// Applied by the composition root after the fixed provisioning delay
    pub fn finish_activation(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.machine.finish_activation(now)
    }

    /// Explicit user toggle off
    pub fn deactivate(&mut self) -> Result<()> {
        self.machine.deactivate()
    }

    /// One countdown step; returns the status after the step
    pub fn tick(&mut self, now: DateTime<Utc>) -> BoostStatus {
        self.machine.tick(now)
    }

    /// Remaining time rendered as `HH:MM:SS`
    pub fn countdown_label(&self, now: DateTime<Utc>) -> String {
        let total = self.machine.remaining(now).as_secs();
        format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }

    /// The remote profile record disappeared: force everything off and tell
    /// the user why their boost vanished.
    pub fn on_profile_deleted(&mut self) {
        if let Err(err) = self.machine.profile_invalidated() {
            log::warn!("failed to purge local state after profile deletion: {err}");
        }
        self.notice = Some("Your driver profile was removed. Boost is disabled.".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::profile::InMemoryProfileStore;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn fresh_screen() -> BoostScreen<MemoryStore> {
        let machine =
            BoostMachine::restore(MemoryStore::new(), Duration::from_secs(3600), Utc::now());
        BoostScreen::new(machine)
    }

    #[tokio::test]
    async fn test_activation_without_agreement_prompts() {
        let mut screen = fresh_screen();
        assert_eq!(screen.request_activation(), ActivationOutcome::NeedsAgreement);
        assert!(screen.notice.is_some());
        assert_eq!(screen.status(), BoostStatus::Off);
    }

    #[tokio::test]
    async fn test_activation_without_profile_opens_registration() {
        let mut screen = fresh_screen();
        screen.set_agreed(true);
        assert_eq!(
            screen.request_activation(),
            ActivationOutcome::NeedsRegistration
        );
        assert!(screen.registration_open);
    }

    #[tokio::test]
    async fn test_registration_then_activation() {
        let store = InMemoryProfileStore::new();
        let mut screen = fresh_screen();
        screen.set_agreed(true);
        screen.request_activation();

        let id = screen
            .register(&store, DriverProfile::new("Ivanov I.I.", "A123BC", "comfort"))
            .await
            .unwrap();
        assert!(!screen.registration_open);
        assert_eq!(screen.profile_id().as_deref(), Some(id.as_str()));

        assert_eq!(screen.request_activation(), ActivationOutcome::Provisioning);
        assert_eq!(screen.status(), BoostStatus::Loading);

        let now = Utc::now();
        screen.finish_activation(now).unwrap();
        assert_eq!(screen.status(), BoostStatus::On);
        assert_eq!(screen.countdown_label(now), "01:00:00");
    }

    #[tokio::test]
    async fn test_profile_deletion_resets_with_notice() {
        let store = InMemoryProfileStore::new();
        let mut screen = fresh_screen();
        screen.set_agreed(true);
        screen
            .register(&store, DriverProfile::new("Ivanov I.I.", "A123BC", "comfort"))
            .await
            .unwrap();
        screen.request_activation();
        screen.finish_activation(Utc::now()).unwrap();

        screen.on_profile_deleted();
        assert_eq!(screen.status(), BoostStatus::Off);
        assert!(screen.profile_id().is_none());
        assert!(screen.notice.is_some());
    }
}
