/// Deterministic frame loss for the in-memory transport: every `every`th
/// frame the local side sends never reaches the remote end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameLoss {
    pub every: Option<u32>,
}

impl FrameLoss {
    pub fn every(nth: u32) -> Self {
        Self {
            every: (nth > 0).then_some(nth),
        }
    }

    /// `sequence` counts frames from 1.
    pub fn drops(&self, sequence: u64) -> bool {
        match self.every {
            Some(nth) => sequence % u64::from(nth) == 0,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub envelopes_sent: u64,
    pub envelopes_received: u64,
    pub envelopes_malformed: u64,
    pub envelopes_discarded: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub reconnects: u64,
    pub last_rtt_ms: Option<u64>,
}
