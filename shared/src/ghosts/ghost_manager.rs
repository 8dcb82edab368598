use std::collections::{BTreeSet, HashMap};

use ghostnet_serde::{write_bits, BitWrite, BitWriter, StreamWriter};
use log::{info, trace, warn};

use crate::{
    constants::{FULL_UPDATE_MASK, GHOST_INDEX_BIT_SIZE, GHOST_KILL_PRIORITY, MAX_GHOST_COUNT},
    events::{
        connection_message::{ConnectionMessage, ConnectionMessageEvent},
        ghost_always_event::GhostAlwaysObjectEvent,
        net_event::NetEvent,
    },
    ghosts::{
        error::GhostError,
        ghost_info::{GhostFlags, GhostInfo, GhostRef},
        object_registry::{ObjectChange, ObjectFlags, ObjectId, ObjectRegistry},
        scope::{GhostScope, ScopeEverything, ScopeQuery},
    },
    pack_context::PackContext,
    types::GhostIndex,
};

/// Bits the ghost section needs even when it carries no ghost: the
/// ghosting flag, the index size and the terminator
pub const GHOST_SECTION_RESERVED_BITS: u32 = 1 + GHOST_INDEX_BIT_SIZE as u32 + 1;

/// Sending side of ghosting for one connection: which objects the peer holds
/// copies of, under which index, and what each copy is missing
pub struct GhostManager {
    ghosts: Vec<Option<GhostInfo>>,
    free_indices: BTreeSet<GhostIndex>,
    object_to_ghost: HashMap<ObjectId, GhostIndex>,
    ghosting: bool,
    scoping: bool,
    ghosting_sequence: u32,
    scope_query: Option<Box<dyn ScopeQuery>>,
    is_local: bool,
}

impl GhostManager {
    pub fn new(is_local: bool) -> Self {
        let mut ghosts = Vec::with_capacity(MAX_GHOST_COUNT);
        ghosts.resize_with(MAX_GHOST_COUNT, || None);
        Self {
            ghosts,
            free_indices: (0..MAX_GHOST_COUNT as GhostIndex).collect(),
            object_to_ghost: HashMap::new(),
            ghosting: false,
            scoping: false,
            ghosting_sequence: 0,
            scope_query: Some(Box::new(ScopeEverything)),
            is_local,
        }
    }

    pub fn set_is_local(&mut self, is_local: bool) {
        self.is_local = is_local;
    }

    pub fn set_scope_query(&mut self, query: Box<dyn ScopeQuery>) {
        self.scope_query = Some(query);
    }

    pub fn is_ghosting(&self) -> bool {
        self.ghosting
    }

    pub fn is_scoping(&self) -> bool {
        self.scoping
    }

    pub fn ghosting_sequence(&self) -> u32 {
        self.ghosting_sequence
    }

    /// Number of allocated ghost slots, including ghosts being killed
    pub fn ghost_count(&self) -> usize {
        MAX_GHOST_COUNT - self.free_indices.len()
    }

    pub fn ghost(&self, index: GhostIndex) -> Option<&GhostInfo> {
        self.ghosts.get(index as usize)?.as_ref()
    }

    /// Index of the peer's copy of `id`, once that copy is fully ghosted
    pub fn get_ghost_index(&self, id: ObjectId) -> Option<GhostIndex> {
        let index = *self.object_to_ghost.get(&id)?;
        let ghost = self.ghost(index)?;
        ghost.is_available().then_some(index)
    }

    pub fn resolve_object(&self, index: GhostIndex) -> Option<ObjectId> {
        self.ghost(index)?.object
    }

    // Allocation

    fn allocate(&mut self, from_top: bool) -> Option<GhostIndex> {
        if from_top {
            self.free_indices.pop_last()
        } else {
            self.free_indices.pop_first()
        }
    }

    fn free_ghost(&mut self, index: GhostIndex) {
        let Some(slot) = self.ghosts.get_mut(index as usize) else {
            return;
        };
        if let Some(ghost) = slot.take() {
            if let Some(id) = ghost.object {
                self.object_to_ghost.remove(&id);
            }
            self.free_indices.insert(index);
            trace!("GhostManager: freed ghost {}", index);
        }
    }

    /// Marks `id` in scope, allocating a ghost if it has none yet
    pub fn object_in_scope(
        &mut self,
        id: ObjectId,
        flags: ObjectFlags,
        from_top: bool,
    ) -> Result<Option<GhostIndex>, GhostError> {
        if !self.scoping || !flags.contains(ObjectFlags::GHOSTABLE) {
            return Ok(None);
        }
        if flags.contains(ObjectFlags::SCOPE_LOCAL) && !self.is_local {
            return Ok(None);
        }

        if let Some(index) = self.object_to_ghost.get(&id).copied() {
            if let Some(ghost) = self.ghosts[index as usize].as_mut() {
                ghost.flags.insert(GhostFlags::IN_SCOPE);
            }
            return Ok(Some(index));
        }

        let Some(index) = self.allocate(from_top) else {
            return Err(GhostError::TableFull {
                capacity: MAX_GHOST_COUNT,
            });
        };

        let mut ghost_flags = GhostFlags::NOT_YET_GHOSTED | GhostFlags::IN_SCOPE;
        if flags.contains(ObjectFlags::SCOPE_ALWAYS) {
            ghost_flags.insert(GhostFlags::SCOPE_ALWAYS);
        }
        let mut ghost = GhostInfo::new(index, id, ghost_flags);
        ghost.update_mask = FULL_UPDATE_MASK;

        self.ghosts[index as usize] = Some(ghost);
        self.object_to_ghost.insert(id, index);
        Ok(Some(index))
    }

    /// Schedules a kill for the ghost at `index`
    fn detach(&mut self, index: GhostIndex, final_update: Option<StreamWriter>) {
        let Some(ghost) = self.ghosts[index as usize].as_mut() else {
            return;
        };
        ghost.flags.insert(GhostFlags::KILL_GHOST);
        ghost.flags.remove(GhostFlags::IN_SCOPE);
        if ghost.update_mask == 0 {
            ghost.update_mask = FULL_UPDATE_MASK;
        }
        ghost.final_update = final_update;
        if let Some(id) = ghost.object.take() {
            self.object_to_ghost.remove(&id);
        }
    }

    pub fn object_local_scope_always(&mut self, id: ObjectId, objects: &ObjectRegistry) {
        let Some(flags) = objects.flags(id) else {
            return;
        };
        match self.object_in_scope(id, flags, false) {
            Ok(Some(index)) => {
                if let Some(ghost) = self.ghosts[index as usize].as_mut() {
                    ghost.flags.insert(GhostFlags::SCOPE_LOCAL_ALWAYS);
                }
            }
            Ok(None) => {}
            Err(error) => warn!("GhostManager: {}", error),
        }
    }

    pub fn object_local_clear_always(&mut self, id: ObjectId) {
        if let Some(index) = self.object_to_ghost.get(&id).copied() {
            if let Some(ghost) = self.ghosts[index as usize].as_mut() {
                ghost.flags.remove(GhostFlags::SCOPE_LOCAL_ALWAYS);
            }
        }
    }

    // Lifecycle

    /// Starts a ghosting session: every scope-always object is delivered by
    /// event, framed by GhostAlwaysStarting and GhostAlwaysDone. Returns the
    /// events to post, in order.
    pub fn activate(&mut self, objects: &ObjectRegistry) -> Result<Vec<Box<dyn NetEvent>>, GhostError> {
        let count = self.ghost_count();
        if count > 0 {
            return Err(GhostError::GhostsStillActive { count });
        }

        self.ghosting_sequence = self.ghosting_sequence.wrapping_add(1);
        self.scoping = true;

        let mut always = Vec::new();
        for id in objects.scope_always_objects() {
            let Some(flags) = objects.flags(id) else {
                continue;
            };
            match self.object_in_scope(id, flags, true) {
                Ok(Some(index)) => always.push((id, index)),
                Ok(None) => {}
                Err(error) => {
                    warn!("GhostManager: {}", error);
                    break;
                }
            }
        }

        let mut events: Vec<Box<dyn NetEvent>> = Vec::with_capacity(always.len() + 2);
        events.push(Box::new(ConnectionMessageEvent::new(
            ConnectionMessage::GhostAlwaysStarting,
            self.ghosting_sequence,
            always.len() as u32,
        )));
        for (id, index) in always {
            if let Some(ghost) = self.ghosts[index as usize].as_mut() {
                ghost.update_mask = 0;
                ghost.flags.remove(GhostFlags::NOT_YET_GHOSTED);
                ghost.flags.insert(GhostFlags::SCOPED_EVENT);
            }
            events.push(Box::new(GhostAlwaysObjectEvent::new(id, index)));
        }
        events.push(Box::new(ConnectionMessageEvent::new(
            ConnectionMessage::GhostAlwaysDone,
            self.ghosting_sequence,
            0,
        )));

        info!(
            "GhostManager: ghosting activated (sequence {}, {} scope-always objects)",
            self.ghosting_sequence,
            events.len() - 2
        );
        Ok(events)
    }

    /// The peer installed every scope-always object of session `sequence`
    pub fn ready_for_normal_ghosts(&mut self, sequence: u32) -> bool {
        if sequence != self.ghosting_sequence {
            return false;
        }
        self.ghosting = true;
        for ghost in self.ghosts.iter_mut().flatten() {
            if ghost.flags.contains(GhostFlags::SCOPED_EVENT) {
                ghost.flags.remove(GhostFlags::GHOSTING | GhostFlags::SCOPED_EVENT);
            }
        }
        true
    }

    /// Ends the session; returns the EndGhosting message for the peer. The
    /// caller resolves the in-flight refs and then calls [`Self::free_all`].
    pub fn reset(&mut self) -> ConnectionMessageEvent {
        self.ghosting = false;
        self.scoping = false;
        let message =
            ConnectionMessageEvent::new(ConnectionMessage::EndGhosting, self.ghosting_sequence, 0);
        self.ghosting_sequence = self.ghosting_sequence.wrapping_add(1);
        info!("GhostManager: ghosting reset");
        message
    }

    pub fn free_all(&mut self) {
        for slot in self.ghosts.iter_mut() {
            *slot = None;
        }
        self.object_to_ghost.clear();
        self.free_indices = (0..MAX_GHOST_COUNT as GhostIndex).collect();
    }

    /// Applies registry changes to this connection's ghosts
    pub fn apply_changes(&mut self, changes: &[ObjectChange], context: &PackContext) {
        for change in changes {
            match change {
                ObjectChange::Dirty { id, mask } => {
                    if let Some(index) = self.object_to_ghost.get(id).copied() {
                        if let Some(ghost) = self.ghosts[index as usize].as_mut() {
                            ghost.update_mask |= mask;
                        }
                    }
                }
                ObjectChange::ScopeAlwaysSet { id } => {
                    if !self.ghosting {
                        continue;
                    }
                    if let Some(flags) = context.objects.flags(*id) {
                        if let Err(error) = self.object_in_scope(*id, flags, false) {
                            warn!("GhostManager: {}", error);
                        }
                    }
                }
                ObjectChange::ScopeAlwaysCleared { id } => {
                    if let Some(index) = self.object_to_ghost.get(id).copied() {
                        self.detach(index, None);
                    }
                }
                ObjectChange::Removed { id, object } => {
                    let Some(index) = self.object_to_ghost.get(id).copied() else {
                        continue;
                    };
                    let final_update = self.ghosts[index as usize].as_ref().and_then(|ghost| {
                        if ghost.update_mask == 0
                            || ghost.flags.contains(GhostFlags::NOT_YET_GHOSTED)
                        {
                            return None;
                        }
                        let mut staged = StreamWriter::new();
                        object.pack_update(context, ghost.update_mask, &mut staged);
                        Some(staged)
                    });
                    self.detach(index, final_update);
                }
            }
        }
    }

    // Packets

    fn update_scope(&mut self, objects: &ObjectRegistry) {
        for ghost in self.ghosts.iter_mut().flatten() {
            if ghost.object.is_none() {
                continue;
            }
            if ghost.update_mask != 0 {
                ghost.update_skip_count += 1;
            }
            if !ghost
                .flags
                .intersects(GhostFlags::SCOPE_ALWAYS | GhostFlags::SCOPE_LOCAL_ALWAYS)
            {
                ghost.flags.remove(GhostFlags::IN_SCOPE);
            }
        }

        if self.scoping {
            if let Some(mut query) = self.scope_query.take() {
                let mut scope = GhostScope::new();
                query.scope(objects, &mut scope);
                self.scope_query = Some(query);

                for id in scope.into_objects() {
                    let Some(flags) = objects.flags(id) else {
                        continue;
                    };
                    if let Err(error) = self.object_in_scope(id, flags, false) {
                        warn!("GhostManager: {}", error);
                        break;
                    }
                }
            }
        }

        let out_of_scope: Vec<GhostIndex> = self
            .ghosts
            .iter()
            .flatten()
            .filter(|ghost| ghost.object.is_some() && !ghost.flags.contains(GhostFlags::IN_SCOPE))
            .map(|ghost| ghost.index)
            .collect();
        for index in out_of_scope {
            self.detach(index, None);
        }
    }

    /// Writes the ghost section of a packet: scope is re-evaluated, then the
    /// dirty ghosts are written highest priority first while they fit. The
    /// caller must have released [`GHOST_SECTION_RESERVED_BITS`].
    pub fn write_packet(&mut self, writer: &mut BitWriter, context: &PackContext) -> Vec<GhostRef> {
        let mut refs = Vec::new();

        writer.write_bit(self.ghosting);
        if !self.ghosting {
            return refs;
        }

        self.update_scope(context.objects);

        let mut max_index: u32 = 0;
        let mut unsent_kills = Vec::new();
        let mut candidates = Vec::new();
        for ghost in self.ghosts.iter_mut().flatten() {
            if ghost.update_mask == 0 && !ghost.flags.contains(GhostFlags::KILL_GHOST) {
                continue;
            }
            max_index = max_index.max(u32::from(ghost.index));

            if ghost
                .flags
                .contains(GhostFlags::KILL_GHOST | GhostFlags::NOT_YET_GHOSTED)
            {
                unsent_kills.push(ghost.index);
                continue;
            }

            ghost.priority = if ghost
                .flags
                .intersects(GhostFlags::KILLING_GHOST | GhostFlags::GHOSTING)
            {
                0.0
            } else if ghost.flags.contains(GhostFlags::KILL_GHOST) {
                GHOST_KILL_PRIORITY
            } else {
                ghost
                    .object
                    .and_then(|id| context.objects.get(id))
                    .map(|object| object.update_priority(ghost.update_mask, ghost.update_skip_count))
                    .unwrap_or(0.0)
            };
            candidates.push((ghost.index, ghost.priority));
        }
        for index in unsent_kills {
            self.free_ghost(index);
        }

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let index_bits = (32 - max_index.leading_zeros()).max(3) as u8;
        write_bits(writer, u32::from(index_bits - 3), GHOST_INDEX_BIT_SIZE);

        writer.reserve_bits(1);
        let object_kinds = &context.protocol.object_kinds;

        for (index, _) in candidates.into_iter().rev() {
            let Some(ghost) = self.ghosts[index as usize].as_mut() else {
                continue;
            };
            if ghost
                .flags
                .intersects(GhostFlags::KILLING_GHOST | GhostFlags::GHOSTING)
            {
                continue;
            }

            let is_kill = ghost.flags.contains(GhostFlags::KILL_GHOST);
            let is_new = ghost.flags.contains(GhostFlags::NOT_YET_GHOSTED);

            let mut staged = StreamWriter::new();
            staged.write_bit(true);
            write_bits(&mut staged, u32::from(index), index_bits);
            staged.write_bit(is_kill);

            let mut retained_mask = 0;
            if is_kill {
                match &ghost.final_update {
                    Some(final_update) => {
                        staged.write_bit(true);
                        final_update.copy_into(&mut staged);
                    }
                    None => staged.write_bit(false),
                }
            } else {
                let Some(object) = ghost.object.and_then(|id| context.objects.get(id)) else {
                    continue;
                };
                if is_new {
                    let Some(class_id) = object_kinds.class_id_of(object) else {
                        warn!("GhostManager: object of ghost {} is not registered", index);
                        continue;
                    };
                    object_kinds.write_class_id(&mut staged, class_id);
                }
                retained_mask = object.pack_update(context, ghost.update_mask, &mut staged);
            }

            if staged.bits_written() > writer.bits_free() {
                continue;
            }
            staged.copy_into(writer);

            let ghost_ref = if is_kill {
                ghost.flags.remove(GhostFlags::KILL_GHOST);
                ghost.flags.insert(GhostFlags::KILLING_GHOST);
                let mask = ghost.update_mask;
                ghost.update_mask = 0;
                GhostRef {
                    index,
                    mask,
                    flags: GhostFlags::KILLING_GHOST,
                }
            } else {
                let mut ref_flags = GhostFlags::empty();
                if is_new {
                    ghost.flags.remove(GhostFlags::NOT_YET_GHOSTED);
                    ghost.flags.insert(GhostFlags::GHOSTING);
                    ref_flags = GhostFlags::GHOSTING;
                }
                let mask = ghost.update_mask & !retained_mask;
                ghost.update_mask = retained_mask;
                GhostRef {
                    index,
                    mask,
                    flags: ref_flags,
                }
            };

            ghost.in_flight.push_back(ghost_ref.mask);
            ghost.update_skip_count = 0;
            refs.push(ghost_ref);
        }

        writer.release_bits(1);
        writer.write_bit(false);

        refs
    }

    pub fn packet_received(&mut self, refs: &[GhostRef]) {
        for ghost_ref in refs {
            let Some(ghost) = self.ghosts[ghost_ref.index as usize].as_mut() else {
                warn!("GhostManager: ack for unallocated ghost {}", ghost_ref.index);
                continue;
            };
            ghost.resolve_oldest();

            if ghost_ref.flags.contains(GhostFlags::GHOSTING) {
                ghost.flags.remove(GhostFlags::GHOSTING);
            } else if ghost_ref.flags.contains(GhostFlags::KILLING_GHOST) {
                self.free_ghost(ghost_ref.index);
            }
        }
    }

    /// Re-dirties the bits of lost refs that no later packet carries, and
    /// rolls back lost creates and kills
    pub fn packet_dropped(&mut self, refs: &[GhostRef]) {
        for ghost_ref in refs {
            let Some(ghost) = self.ghosts[ghost_ref.index as usize].as_mut() else {
                warn!("GhostManager: loss for unallocated ghost {}", ghost_ref.index);
                continue;
            };
            let later = ghost.resolve_oldest();
            ghost.update_mask |= ghost_ref.mask & !later;

            if ghost_ref.flags.contains(GhostFlags::GHOSTING) {
                ghost.flags.remove(GhostFlags::GHOSTING);
                ghost.flags.insert(GhostFlags::NOT_YET_GHOSTED);
            } else if ghost_ref.flags.contains(GhostFlags::KILLING_GHOST) {
                ghost.flags.remove(GhostFlags::KILLING_GHOST);
                ghost.flags.insert(GhostFlags::KILL_GHOST);
            }
        }
    }
}
