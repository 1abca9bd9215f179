// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Feature activations, deactivations and alerts (`spec.md` §4.7 types
//! 65534/65533/65535). Activations are scheduled for a future block and
//! re-loaded on startup; alerts carry an expiry and are otherwise opaque to
//! the core.

use std::collections::BTreeMap;

use crate::types::BlockHeight;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub feature_id: u16,
    pub activation_block: BlockHeight,
    pub min_client_version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: u16,
    pub expiry_block: BlockHeight,
    pub message: String,
}

/// Scheduled activations plus currently-live features, and outstanding
/// alerts, all keyed so a reorg can roll them back deterministically
/// (`spec.md` §4.7, §4.9).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FeatureRegistry {
    scheduled: BTreeMap<u16, Activation>,
    live: BTreeMap<u16, BlockHeight>,
    alerts: Vec<Alert>,
}

impl FeatureRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn schedule(&mut self, activation: Activation) { self.scheduled.insert(activation.feature_id, activation); }

    pub fn deactivate(&mut self, feature_id: u16) {
        self.scheduled.remove(&feature_id);
        self.live.remove(&feature_id);
    }

    pub fn is_live(&self, feature_id: u16, at_block: BlockHeight) -> bool {
        self.live.get(&feature_id).map(|&since| since <= at_block).unwrap_or(false)
    }

    /// `begin(B): apply any features whose live_block == h` (`spec.md`
    /// §4.8). Scheduled activations whose `activation_block` has been
    /// reached become live and drop out of the scheduled set.
    pub fn apply_due(&mut self, height: BlockHeight) -> Vec<u16> {
        let due: Vec<u16> =
            self.scheduled.iter().filter(|(_, a)| a.activation_block <= height).map(|(id, _)| *id).collect();
        for id in &due {
            if let Some(activation) = self.scheduled.remove(id) {
                self.live.insert(*id, activation.activation_block);
            }
        }
        due
    }

    pub fn push_alert(&mut self, alert: Alert) { self.alerts.push(alert); }

    /// `end(B): check alert expirations` (`spec.md` §4.8); drops and
    /// returns every alert whose expiry has passed.
    pub fn expire_alerts(&mut self, height: BlockHeight) -> Vec<Alert> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.alerts).into_iter().partition(|a| a.expiry_block < height);
        self.alerts = kept;
        expired
    }

    pub fn iter_alerts(&self) -> impl Iterator<Item = &Alert> { self.alerts.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_becomes_live_at_its_block() {
        let mut reg = FeatureRegistry::new();
        reg.schedule(Activation { feature_id: 1, activation_block: 100, min_client_version: 1 });
        assert!(!reg.is_live(1, 99));
        let due = reg.apply_due(100);
        assert_eq!(due, vec![1]);
        assert!(reg.is_live(1, 100));
    }

    #[test]
    fn expired_alerts_are_dropped() {
        let mut reg = FeatureRegistry::new();
        reg.push_alert(Alert { alert_type: 1, expiry_block: 50, message: "hi".into() });
        assert_eq!(reg.expire_alerts(51).len(), 1);
        assert_eq!(reg.iter_alerts().count(), 0);
    }
}
