use std::collections::VecDeque;

use crate::game_time::GameInstant;

/// Simulated network conditions applied to outgoing packets
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConditionerConfig {
    /// Chance, from 0.0 to 1.0, that a packet is silently dropped
    pub packet_loss: f32,
    /// Milliseconds every packet is held before it is sent
    pub ping_ms: u32,
}

impl LinkConditionerConfig {
    pub fn new(packet_loss: f32, ping_ms: u32) -> Self {
        Self {
            packet_loss: packet_loss.clamp(0.0, 1.0),
            ping_ms,
        }
    }

    pub fn is_active(&self) -> bool {
        self.packet_loss > 0.0 || self.ping_ms > 0
    }
}

/// Drops and delays outgoing packets according to a [`LinkConditionerConfig`].
/// A dropped packet still leaves its notify behind, so it resolves as lost
/// through the normal ack path.
pub struct LinkConditioner {
    config: LinkConditionerConfig,
    rng: fastrand::Rng,
    delayed: VecDeque<(GameInstant, Vec<u8>)>,
}

impl LinkConditioner {
    pub fn new(config: LinkConditionerConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            config,
            rng,
            delayed: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &LinkConditionerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LinkConditionerConfig) {
        self.config = config;
    }

    pub fn should_drop(&mut self) -> bool {
        self.config.packet_loss > 0.0 && self.rng.f32() < self.config.packet_loss
    }

    pub fn is_delaying(&self) -> bool {
        self.config.ping_ms > 0
    }

    pub fn delay(&mut self, now: GameInstant, packet: Vec<u8>) {
        let due = now.add_millis(self.config.ping_ms);
        self.delayed.push_back((due, packet));
    }

    /// Packets whose delay has elapsed, in send order
    pub fn take_due(&mut self, now: GameInstant) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        while let Some((release, _)) = self.delayed.front() {
            if !now.has_reached(release) {
                break;
            }
            if let Some((_, packet)) = self.delayed.pop_front() {
                due.push(packet);
            }
        }
        due
    }
}
