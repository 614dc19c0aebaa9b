use serde::{Deserialize, Serialize};

/// Periodic counters pushed to the downstream consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub queued: usize,
    pub active: usize,
    pub connected: usize,
}
