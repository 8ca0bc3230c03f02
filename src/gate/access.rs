//! Access gate for sensitive destinations
//!
//! States: `Locked`, `Unlocking { progress }`, `Open`. A navigation to a
//! sensitive destination is deferred while locked. Completing the hold
//! ritual applies the deferred destination exactly once and re-locks, so
//! every gated navigation needs its own unlock. Guest mode skips the gate
//! entirely.

use super::ritual::HoldRitual;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

/// Navigation target identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ViewId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ViewId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Open,
    Locked,
    Unlocking { progress: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Navigate now
    Proceed(ViewId),
    /// Held until the ritual completes
    Deferred(ViewId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockTick {
    /// No ritual in progress
    Idle,
    Progress(u8),
    /// Released before completion; back to `Locked` with no credit kept
    Reset,
    /// Ritual completed; carries the destination to apply, if one was pending
    Unlocked(Option<ViewId>),
}

pub struct AccessGate {
    sensitive: HashSet<ViewId>,
    ritual: HoldRitual,
    guest_mode: bool,
    state: GateState,
    pending: Option<ViewId>,
    hold_started: Option<Instant>,
    unlocks: u64,
}

impl AccessGate {
    pub fn new<I, V>(sensitive: I, ritual: HoldRitual, guest_mode: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ViewId>,
    {
        Self {
            sensitive: sensitive.into_iter().map(Into::into).collect(),
            ritual,
            guest_mode,
            state: GateState::Locked,
            pending: None,
            hold_started: None,
            unlocks: 0,
        }
    }

    pub fn is_sensitive(&self, destination: &ViewId) -> bool {
        self.sensitive.contains(destination)
    }

    pub fn guest_mode(&self) -> bool {
        self.guest_mode
    }

    /// Toggling guest mode drops any attempt in progress
    pub fn set_guest_mode(&mut self, enabled: bool) {
        if self.guest_mode != enabled {
            tracing::info!("Guest mode {}", if enabled { "enabled" } else { "disabled" });
            self.guest_mode = enabled;
            self.reset();
        }
    }

    /// Observable state. Guest mode reports `Open` universally.
    pub fn state(&self) -> GateState {
        if self.guest_mode {
            GateState::Open
        } else {
            self.state
        }
    }

    pub fn pending_destination(&self) -> Option<&ViewId> {
        self.pending.as_ref()
    }

    /// Completed unlocks since creation
    pub fn unlock_count(&self) -> u64 {
        self.unlocks
    }

    pub fn request_navigate(&mut self, destination: ViewId) -> NavigationDecision {
        if self.guest_mode {
            return NavigationDecision::Proceed(destination);
        }
        if !self.is_sensitive(&destination) {
            // Leaving for an open view abandons any gated navigation in progress
            if self.pending.is_some() || self.hold_started.is_some() {
                tracing::debug!("Navigation to {} drops the pending unlock", destination);
                self.reset();
            }
            return NavigationDecision::Proceed(destination);
        }

        tracing::debug!("Navigation to {} deferred until unlock", destination);
        if self.state == GateState::Open {
            self.state = GateState::Locked;
        }
        self.pending = Some(destination.clone());
        NavigationDecision::Deferred(destination)
    }

    /// Start the hold ritual. Ignored in guest mode or if already holding.
    pub fn unlock_begin(&mut self, now: Instant) -> UnlockTick {
        if self.guest_mode {
            return UnlockTick::Idle;
        }
        if let GateState::Unlocking { progress } = self.state {
            return UnlockTick::Progress(progress);
        }
        self.state = GateState::Unlocking { progress: 0 };
        self.hold_started = Some(now);
        self.tick(now)
    }

    /// Advance progress while the hold continues
    pub fn tick(&mut self, now: Instant) -> UnlockTick {
        let (previous, started) = match (self.state, self.hold_started) {
            (GateState::Unlocking { progress }, Some(started)) => (progress, started),
            _ => return UnlockTick::Idle,
        };

        let progress = self
            .ritual
            .progress_at(now.saturating_duration_since(started))
            .max(previous);
        if progress >= 100 {
            return UnlockTick::Unlocked(self.complete());
        }
        self.state = GateState::Unlocking { progress };
        UnlockTick::Progress(progress)
    }

    /// Release the hold. Completes if the target was reached, otherwise resets.
    pub fn unlock_end(&mut self, now: Instant) -> UnlockTick {
        match self.tick(now) {
            UnlockTick::Progress(progress) => {
                tracing::debug!("Unlock released at {}%", progress);
                self.state = GateState::Locked;
                self.hold_started = None;
                UnlockTick::Reset
            }
            other => other,
        }
    }

    /// Abandon the pending navigation
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn complete(&mut self) -> Option<ViewId> {
        self.state = GateState::Open;
        let destination = self.pending.take();
        self.unlocks += 1;
        tracing::info!(
            "Gate unlocked{}",
            destination
                .as_ref()
                .map(|d| format!(", navigating to {}", d))
                .unwrap_or_default()
        );

        // Single use: the next sensitive navigation starts locked again
        self.state = GateState::Locked;
        self.hold_started = None;
        destination
    }

    fn reset(&mut self) {
        self.state = GateState::Locked;
        self.pending = None;
        self.hold_started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ritual::DEFAULT_HOLD_DURATION;
    use std::time::Duration;

    fn gate() -> AccessGate {
        AccessGate::new(["vault", "ledger"], HoldRitual::default(), false)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_non_sensitive_navigation_proceeds() {
        let mut gate = gate();
        assert_eq!(
            gate.request_navigate("home".into()),
            NavigationDecision::Proceed("home".into())
        );
        assert_eq!(gate.state(), GateState::Locked);
        assert!(gate.pending_destination().is_none());
    }

    #[test]
    fn test_sensitive_navigation_is_deferred() {
        let mut gate = gate();
        assert_eq!(
            gate.request_navigate("vault".into()),
            NavigationDecision::Deferred("vault".into())
        );
        assert_eq!(gate.state(), GateState::Locked);
        assert_eq!(gate.pending_destination(), Some(&ViewId::from("vault")));
    }

    #[test]
    fn test_full_hold_applies_destination_once_then_relocks() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.request_navigate("vault".into());

        assert_eq!(gate.unlock_begin(t0), UnlockTick::Progress(0));
        assert_eq!(gate.tick(t0 + ms(1250)), UnlockTick::Progress(50));
        assert_eq!(gate.state(), GateState::Unlocking { progress: 50 });
        assert_eq!(
            gate.tick(t0 + DEFAULT_HOLD_DURATION),
            UnlockTick::Unlocked(Some("vault".into()))
        );

        assert_eq!(gate.state(), GateState::Locked);
        assert!(gate.pending_destination().is_none());
        assert_eq!(gate.unlock_count(), 1);
        // Releasing afterwards changes nothing
        assert_eq!(gate.unlock_end(t0 + ms(3000)), UnlockTick::Idle);

        // A second sensitive request needs a new unlock
        assert_eq!(
            gate.request_navigate("ledger".into()),
            NavigationDecision::Deferred("ledger".into())
        );
        assert_eq!(gate.state(), GateState::Locked);
    }

    #[test]
    fn test_release_completes_when_target_reached() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.request_navigate("ledger".into());
        gate.unlock_begin(t0);

        assert_eq!(
            gate.unlock_end(t0 + ms(2600)),
            UnlockTick::Unlocked(Some("ledger".into()))
        );
    }

    #[test]
    fn test_early_release_resets_without_credit() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.request_navigate("vault".into());

        gate.unlock_begin(t0);
        assert_eq!(gate.tick(t0 + ms(2000)), UnlockTick::Progress(80));
        assert_eq!(gate.unlock_end(t0 + ms(2000)), UnlockTick::Reset);
        assert_eq!(gate.state(), GateState::Locked);
        // Pending destination survives the failed attempt
        assert_eq!(gate.pending_destination(), Some(&ViewId::from("vault")));

        // New attempt starts from zero
        let t1 = t0 + ms(5000);
        assert_eq!(gate.unlock_begin(t1), UnlockTick::Progress(0));
        assert_eq!(gate.tick(t1 + ms(1000)), UnlockTick::Progress(40));
        assert_eq!(gate.unlock_count(), 0);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut gate = gate();
        let t0 = Instant::now() + ms(10_000);
        gate.unlock_begin(t0);
        assert_eq!(gate.tick(t0 + ms(1500)), UnlockTick::Progress(60));
        // Out-of-order clock reading
        assert_eq!(gate.tick(t0 + ms(500)), UnlockTick::Progress(60));
    }

    #[test]
    fn test_begin_while_holding_is_ignored() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.unlock_begin(t0);
        gate.tick(t0 + ms(1000));
        assert_eq!(gate.unlock_begin(t0 + ms(1200)), UnlockTick::Progress(40));
    }

    #[test]
    fn test_open_navigation_abandons_pending_unlock() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.request_navigate("vault".into());
        gate.unlock_begin(t0);
        assert_eq!(gate.tick(t0 + ms(1000)), UnlockTick::Progress(40));

        assert_eq!(
            gate.request_navigate("home".into()),
            NavigationDecision::Proceed("home".into())
        );
        assert_eq!(gate.state(), GateState::Locked);
        assert!(gate.pending_destination().is_none());
        // Finishing the old hold cannot pull the user back to the vault
        assert_eq!(gate.unlock_end(t0 + ms(3000)), UnlockTick::Idle);
        assert_eq!(gate.unlock_count(), 0);
    }

    #[test]
    fn test_cancel_clears_pending() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.request_navigate("vault".into());
        gate.unlock_begin(t0);
        gate.cancel();

        assert_eq!(gate.state(), GateState::Locked);
        assert!(gate.pending_destination().is_none());
        assert_eq!(gate.tick(t0 + ms(3000)), UnlockTick::Idle);
    }

    #[test]
    fn test_unlock_without_pending_destination() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.unlock_begin(t0);
        assert_eq!(gate.unlock_end(t0 + ms(2500)), UnlockTick::Unlocked(None));
    }

    #[test]
    fn test_guest_mode_bypasses_gate() {
        let mut gate = AccessGate::new(["vault"], HoldRitual::default(), true);
        assert_eq!(
            gate.request_navigate("vault".into()),
            NavigationDecision::Proceed("vault".into())
        );
        assert_eq!(gate.state(), GateState::Open);
        assert!(gate.pending_destination().is_none());
        assert_eq!(gate.unlock_begin(Instant::now()), UnlockTick::Idle);
    }

    #[test]
    fn test_enabling_guest_mode_drops_pending() {
        let mut gate = gate();
        gate.request_navigate("vault".into());
        gate.set_guest_mode(true);
        assert!(gate.pending_destination().is_none());

        gate.set_guest_mode(false);
        assert_eq!(gate.state(), GateState::Locked);
    }
}
