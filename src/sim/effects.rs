//! Time-boxed overrides installed by commands and consumed by the model.

use serde::Serialize;

use super::types::SimTime;

/// Kind of override a pending effect applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    /// Charge at rated power until expiry or full.
    ForceCharge,
    /// Grid exchange forced to zero until removed.
    Isolate,
    /// Device offline until expiry.
    Reboot,
    /// Device updating until expiry, then the new firmware is installed.
    FirmwareUpdate,
}

/// A pending override with its expiry and parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEffect {
    /// What the effect overrides.
    pub kind: EffectKind,
    /// Simulated time the effect was installed.
    pub issued_at: SimTime,
    /// Simulated time at which the effect lapses; `None` for indefinite.
    pub expires_at: Option<SimTime>,
    /// Firmware version installed when a firmware update completes.
    pub firmware_version: Option<String>,
}

impl PendingEffect {
    /// Creates an effect lasting `duration_s` simulated seconds from `now`.
    pub fn timed(kind: EffectKind, now: SimTime, duration_s: u64) -> Self {
        Self {
            kind,
            issued_at: now,
            expires_at: Some(now.plus_seconds(duration_s)),
            firmware_version: None,
        }
    }

    /// Creates an effect that stays active until explicitly removed.
    pub fn indefinite(kind: EffectKind, now: SimTime) -> Self {
        Self {
            kind,
            issued_at: now,
            expires_at: None,
            firmware_version: None,
        }
    }

    /// Whether the effect has lapsed at `now`.
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// The set of effects pending on one device; at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EffectSet {
    effects: Vec<PendingEffect>,
}

impl EffectSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `effect`, replacing any effect of the same kind.
    pub fn install(&mut self, effect: PendingEffect) {
        self.effects.retain(|e| e.kind != effect.kind);
        self.effects.push(effect);
    }

    /// Removes and returns the effect of `kind`, if present.
    pub fn remove(&mut self, kind: EffectKind) -> Option<PendingEffect> {
        let idx = self.effects.iter().position(|e| e.kind == kind)?;
        Some(self.effects.remove(idx))
    }

    /// Returns the effect of `kind`, if present.
    pub fn get(&self, kind: EffectKind) -> Option<&PendingEffect> {
        self.effects.iter().find(|e| e.kind == kind)
    }

    /// Whether an effect of `kind` is installed.
    pub fn is_active(&self, kind: EffectKind) -> bool {
        self.get(kind).is_some()
    }

    /// Removes and returns every effect lapsed at `now`, in install order.
    pub fn drain_expired(&mut self, now: SimTime) -> Vec<PendingEffect> {
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.effects)
            .into_iter()
            .partition(|e| e.is_expired(now));
        self.effects = live;
        expired
    }

    /// Iterates over the pending effects.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEffect> {
        self.effects.iter()
    }

    /// Number of pending effects.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effect is pending.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_effect_expires_at_deadline() {
        let e = PendingEffect::timed(EffectKind::ForceCharge, SimTime(60), 1800);
        assert!(!e.is_expired(SimTime(1799)));
        assert!(e.is_expired(SimTime(1860)));
    }

    #[test]
    fn indefinite_never_expires() {
        let e = PendingEffect::indefinite(EffectKind::Isolate, SimTime(0));
        assert!(!e.is_expired(SimTime(u64::MAX)));
    }

    #[test]
    fn install_replaces_same_kind() {
        let mut set = EffectSet::new();
        set.install(PendingEffect::timed(EffectKind::ForceCharge, SimTime(0), 10));
        set.install(PendingEffect::timed(EffectKind::ForceCharge, SimTime(5), 10));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(EffectKind::ForceCharge).map(|e| e.issued_at),
            Some(SimTime(5))
        );
    }

    #[test]
    fn drain_expired_keeps_live_effects() {
        let mut set = EffectSet::new();
        set.install(PendingEffect::timed(EffectKind::Reboot, SimTime(0), 60));
        set.install(PendingEffect::indefinite(EffectKind::Isolate, SimTime(0)));
        let expired = set.drain_expired(SimTime(60));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, EffectKind::Reboot);
        assert!(set.is_active(EffectKind::Isolate));
        assert!(!set.is_active(EffectKind::Reboot));
    }

    #[test]
    fn remove_returns_effect() {
        let mut set = EffectSet::new();
        set.install(PendingEffect::indefinite(EffectKind::Isolate, SimTime(0)));
        assert!(set.remove(EffectKind::Isolate).is_some());
        assert!(set.remove(EffectKind::Isolate).is_none());
        assert!(set.is_empty());
    }
}
