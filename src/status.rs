// LDK-to-LND watchtower bridge
// Written in 2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! The single health signal the embedding application polls to decide
//! whether it is safe to keep accepting channel updates.

/// Coarse health of the bridge as a whole, derived from the delivery
/// pipeline's session state and local blob backlog.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(
    feature = "config",
    derive(serde_crate::Serialize, serde_crate::Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
pub enum BridgeStatus {
    /// every captured commitment has been acknowledged by the tower.
    Protected,
    /// commitments are queued for delivery but none are overdue yet.
    Pending,
    /// delivery has been retried past its first backoff step, or blobs
    /// are accumulating in local storage faster than they drain.
    Degraded,
    /// no tower has been registered yet.
    Unconfigured,
    /// the tower rejected the session permanently, or local storage is
    /// unusable; the embedding application should alert an operator.
    Error(String),
}

impl BridgeStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BridgeStatus::Protected | BridgeStatus::Pending)
    }
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeStatus::Protected => write!(f, "protected"),
            BridgeStatus::Pending => write!(f, "pending"),
            BridgeStatus::Degraded => write!(f, "degraded"),
            BridgeStatus::Unconfigured => write!(f, "unconfigured"),
            BridgeStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_and_pending_are_healthy() {
        assert!(BridgeStatus::Protected.is_healthy());
        assert!(BridgeStatus::Pending.is_healthy());
    }

    #[test]
    fn degraded_unconfigured_and_error_are_unhealthy() {
        assert!(!BridgeStatus::Degraded.is_healthy());
        assert!(!BridgeStatus::Unconfigured.is_healthy());
        assert!(!BridgeStatus::Error("tower rejected session".to_string()).is_healthy());
    }
}
