//! Boost state machine.
//!
//! Client-local, persisted, timer-driven toggle with three states:
//! `Off → Loading → On → Off`. `On → Off` is reachable both by the countdown
//! expiring and by explicit user action; deletion of the remote driver
//! profile forces `On|Loading → Off` out of band.
//!
//! The persisted absolute expiry is the single source of truth: remaining
//! time is always recomputed from `activated_until - now`, never counted in
//! elapsed ticks, so the state survives a full process restart.

use crate::{
    sources::profile::DriverProfile,
    storage::KeyValueStore,
    Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage key for the persisted activation expiry
pub const BOOST_UNTIL_KEY: &str = "boost_until";
/// Storage key for the locally persisted driver profile
pub const PROFILE_KEY: &str = "driver_profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostStatus {
    Off,
    /// Timed, non-cancelable provisioning state
    Loading,
    On,
}

/// User-selectable boost coefficient, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coefficient {
    P15,
    #[default]
    P25,
    P35,
}

impl Coefficient {
    pub fn percent(&self) -> u8 {
        match self {
            Coefficient::P15 => 15,
            Coefficient::P25 => 25,
            Coefficient::P35 => 35,
        }
    }
}

/// What `begin_activation` decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Terms not accepted yet; the screen shows a prompt and nothing changes
    NeedsAgreement,
    /// No driver profile exists; the registration sub-flow opens instead
    NeedsRegistration,
    /// Entered `Loading`; `finish_activation` applies after the fixed delay
    Provisioning,
    /// Already `Loading` or `On`; a repeated press changes nothing and must
    /// not arm another provisioning timer.
    AlreadyActive,
}

/// Locally persisted profile reference: the remote record id plus a copy of
/// the profile itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: String,
    pub profile: DriverProfile,
}

pub struct BoostMachine<S: KeyValueStore> {
    store: S,
    status: BoostStatus,
    activated_until: Option<DateTime<Utc>>,
    coefficient: Coefficient,
    profile: Option<StoredProfile>,
    boost_duration: Duration,
}

impl<S: KeyValueStore> BoostMachine<S> {
    /// Reconstructs the machine from durable state.
    ///
    /// A persisted expiry still in the future resumes as `On` with the
    /// correctly reduced remaining time; an expiry in the past is treated as
    /// `Off` and the stale record is purged.
    pub fn restore(store: S, boost_duration: Duration, now: DateTime<Utc>) -> Self {
        let profile: Option<StoredProfile> = store.get(PROFILE_KEY);
        let persisted: Option<DateTime<Utc>> = store.get(BOOST_UNTIL_KEY);

        let (status, activated_until) = match persisted {
            Some(until) if until > now => (BoostStatus::On, Some(until)),
            Some(_) => {
                if let Err(err) = store.remove(BOOST_UNTIL_KEY) {
                    log::warn!("failed to purge stale boost expiry: {err}");
                }
                (BoostStatus::Off, None)
            }
            None => (BoostStatus::Off, None),
        };

        Self {
            store,
            status,
            activated_until,
            coefficient: Coefficient::default(),
            profile,
            boost_duration,
        }
    }

    pub fn status(&self) -> BoostStatus {
        self.status
    }

    pub fn coefficient(&self) -> Coefficient {
        self.coefficient
    }

    pub fn profile(&self) -> Option<&StoredProfile> {
        self.profile.as_ref()
    }

    /// Seconds left on the active boost, zero when not `On`
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match (self.status, self.activated_until) {
            (BoostStatus::On, Some(until)) => (until - now).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Coefficient is only mutable while `Off`; otherwise this is a no-op.
    pub fn set_coefficient(&mut self, coefficient: Coefficient) {
        if self.status == BoostStatus::Off {
            self.coefficient = coefficient;
        }
    }

    /// Stores the profile reference created by the registration sub-flow
    pub fn set_profile(&mut self, id: String, profile: DriverProfile) -> Result<()> {
        let stored = StoredProfile { id, profile };
        self.store.set(PROFILE_KEY, &stored)?;
        self.profile = Some(stored);
        Ok(())
    }

    /// Guarded `Off → Loading` transition
    pub fn begin_activation(&mut self, agreed: bool) -> ActivationOutcome {
        if self.status != BoostStatus::Off {
            return ActivationOutcome::AlreadyActive;
        }
        if !agreed {
            return ActivationOutcome::NeedsAgreement;
        }
        if self.profile.is_none() {
            return ActivationOutcome::NeedsRegistration;
        }
        self.status = BoostStatus::Loading;
        ActivationOutcome::Provisioning
    }

    /// `Loading → On`: persists the new absolute expiry. Called by the boost
    /// service after the fixed provisioning delay.
    pub fn finish_activation(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != BoostStatus::Loading {
            return Ok(());
        }
        let until = now
            + chrono::Duration::from_std(self.boost_duration)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
        self.store.set(BOOST_UNTIL_KEY, &until)?;
        self.activated_until = Some(until);
        self.status = BoostStatus::On;
        log::info!("boost active until {until}");
        Ok(())
    }

    /// Explicit user toggle `On → Off`; clears the persisted expiry
    pub fn deactivate(&mut self) -> Result<()> {
        if self.status != BoostStatus::On {
            return Ok(());
        }
        self.store.remove(BOOST_UNTIL_KEY)?;
        self.activated_until = None;
        self.status = BoostStatus::Off;
        Ok(())
    }

    /// One countdown step: recomputes remaining time from the absolute
    /// expiry and forces `On → Off` when it reaches zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> BoostStatus {
        if self.status == BoostStatus::On && self.remaining(now) == Duration::ZERO {
            if let Err(err) = self.store.remove(BOOST_UNTIL_KEY) {
                log::warn!("failed to clear boost expiry on timeout: {err}");
            }
            self.activated_until = None;
            self.status = BoostStatus::Off;
        }
        self.status
    }

    /// Forced reset when the remote profile record disappears: any state
    /// drops to `Off` and both durable records are purged.
    pub fn profile_invalidated(&mut self) -> Result<()> {
        self.store.remove(BOOST_UNTIL_KEY)?;
        self.store.remove(PROFILE_KEY)?;
        self.activated_until = None;
        self.profile = None;
        self.status = BoostStatus::Off;
        log::warn!("driver profile invalidated remotely, boost reset");
        Ok(())
    }
}
