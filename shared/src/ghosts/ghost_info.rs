use std::collections::VecDeque;

use bitflags::bitflags;
use ghostnet_serde::StreamWriter;

use crate::{ghosts::object_registry::ObjectId, types::GhostIndex};

bitflags! {
    /// Per-connection state of one ghost
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct GhostFlags: u16 {
        const IN_SCOPE = 1 << 0;
        const SCOPE_ALWAYS = 1 << 1;
        /// Pinned to this connection by `object_local_scope_always`
        const SCOPE_LOCAL_ALWAYS = 1 << 2;
        /// The creating update has not been written yet
        const NOT_YET_GHOSTED = 1 << 3;
        /// The creating update is in flight
        const GHOSTING = 1 << 4;
        /// A kill must be sent
        const KILL_GHOST = 1 << 5;
        /// The kill is in flight; the slot is freed once it is acknowledged
        const KILLING_GHOST = 1 << 6;
        /// Delivered through a GhostAlwaysObject event, not a ghost update
        const SCOPED_EVENT = 1 << 7;
    }
}

impl GhostFlags {
    /// Flags under which the peer does not (yet, or any longer) hold a
    /// usable copy
    pub fn not_available() -> Self {
        GhostFlags::NOT_YET_GHOSTED
            | GhostFlags::GHOSTING
            | GhostFlags::KILL_GHOST
            | GhostFlags::KILLING_GHOST
    }
}

/// One ghost of a packet: the bits written for it and, for creates and
/// kills, the transition in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GhostRef {
    pub index: GhostIndex,
    pub mask: u32,
    pub flags: GhostFlags,
}

/// Sending-side record of one ghost slot
pub struct GhostInfo {
    pub index: GhostIndex,
    /// None once the ghost is being killed
    pub object: Option<ObjectId>,
    pub update_mask: u32,
    pub flags: GhostFlags,
    pub update_skip_count: u32,
    pub priority: f32,
    /// Masks of this ghost's refs in unresolved packets, oldest first
    pub in_flight: VecDeque<u32>,
    /// Last state of an object removed while dirty, sent with the kill
    pub final_update: Option<StreamWriter>,
}

impl GhostInfo {
    pub fn new(index: GhostIndex, object: ObjectId, flags: GhostFlags) -> Self {
        Self {
            index,
            object: Some(object),
            update_mask: 0,
            flags,
            update_skip_count: 0,
            priority: 0.0,
            in_flight: VecDeque::new(),
            final_update: None,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.flags.intersects(GhostFlags::not_available())
    }

    /// Removes the oldest in-flight ref and returns the union of the masks
    /// of every ref sent after it
    pub fn resolve_oldest(&mut self) -> u32 {
        self.in_flight.pop_front();
        self.in_flight.iter().fold(0, |union, mask| union | mask)
    }
}
