use std::collections::VecDeque;

use crate::{events::net_event::EventNote, game_time::GameInstant, ghosts::ghost_info::GhostRef};

/// What one sent Data packet carried, kept until the packet is known to
/// have arrived or been lost
pub struct PacketNotify {
    pub send_time: GameInstant,
    pub rate_changed: bool,
    pub max_rate_changed: bool,
    pub events: Vec<EventNote>,
    pub ghosts: Vec<GhostRef>,
}

impl PacketNotify {
    pub fn new(send_time: GameInstant) -> Self {
        Self {
            send_time,
            rate_changed: false,
            max_rate_changed: false,
            events: Vec::new(),
            ghosts: Vec::new(),
        }
    }
}

/// Notifies of every unresolved Data packet, oldest first. Packets resolve
/// strictly in send order, so only the head is ever taken.
#[derive(Default)]
pub struct PacketNotifyQueue {
    notifies: VecDeque<PacketNotify>,
}

impl PacketNotifyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notify: PacketNotify) {
        self.notifies.push_back(notify);
    }

    pub fn pop_oldest(&mut self) -> Option<PacketNotify> {
        self.notifies.pop_front()
    }

    pub fn len(&self) -> usize {
        self.notifies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifies.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PacketNotify> {
        self.notifies.iter_mut()
    }
}
