use std::{collections::VecDeque, fmt};

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};
use log::warn;

use crate::{
    constants::{FULL_UPDATE_MASK, GHOST_ID_BIT_SIZE, GHOST_INDEX_BIT_SIZE, MAX_GHOST_COUNT},
    ghosts::replicable::Replicable,
    pack_context::{PackContext, UnpackContext},
    types::GhostIndex,
};

/// What happened to the local ghosts while reading a packet
pub enum GhostEvent {
    Created { index: GhostIndex },
    Updated { index: GhostIndex },
    /// The ghost is gone; carries its last state
    Deleted {
        index: GhostIndex,
        object: Box<dyn Replicable>,
    },
}

impl GhostEvent {
    pub fn index(&self) -> GhostIndex {
        match self {
            GhostEvent::Created { index } => *index,
            GhostEvent::Updated { index } => *index,
            GhostEvent::Deleted { index, .. } => *index,
        }
    }
}

impl fmt::Debug for GhostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GhostEvent::Created { index } => write!(f, "Created({})", index),
            GhostEvent::Updated { index } => write!(f, "Updated({})", index),
            GhostEvent::Deleted { index, .. } => write!(f, "Deleted({})", index),
        }
    }
}

/// An entry of the ghost-always save list
pub enum SavedGhost {
    Object {
        index: GhostIndex,
        object: Box<dyn Replicable>,
    },
    /// Closes the batch of one ghosting session
    EndMarker,
}

/// Receiving side of ghosting: the local copies of the peer's objects
pub struct GhostReceiver {
    local_ghosts: Vec<Option<Box<dyn Replicable>>>,
    ghosting_sequence: u32,
    save_list: VecDeque<SavedGhost>,
    events: Vec<GhostEvent>,
}

impl GhostReceiver {
    pub fn new() -> Self {
        let mut local_ghosts = Vec::with_capacity(MAX_GHOST_COUNT);
        local_ghosts.resize_with(MAX_GHOST_COUNT, || None);
        Self {
            local_ghosts,
            ghosting_sequence: 0,
            save_list: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn ghosting_sequence(&self) -> u32 {
        self.ghosting_sequence
    }

    pub fn set_ghosting_sequence(&mut self, sequence: u32) {
        self.ghosting_sequence = sequence;
    }

    pub fn ghost(&self, index: GhostIndex) -> Option<&dyn Replicable> {
        self.local_ghosts.get(index as usize)?.as_deref()
    }

    pub fn ghost_as<R: Replicable>(&self, index: GhostIndex) -> Option<&R> {
        self.ghost(index)?.as_any().downcast_ref::<R>()
    }

    pub fn ghost_count(&self) -> usize {
        self.local_ghosts.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GhostIndex, &dyn Replicable)> {
        self.local_ghosts
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_deref().map(|object| (index as GhostIndex, object)))
    }

    pub fn take_events(&mut self) -> Vec<GhostEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn install(&mut self, index: GhostIndex, object: Box<dyn Replicable>) {
        let Some(slot) = self.local_ghosts.get_mut(index as usize) else {
            return;
        };
        if let Some(old) = slot.replace(object) {
            self.events.push(GhostEvent::Deleted { index, object: old });
        }
        self.events.push(GhostEvent::Created { index });
    }

    /// Deletes every local ghost and forgets the save list
    pub fn clear_all(&mut self) {
        for (index, slot) in self.local_ghosts.iter_mut().enumerate() {
            if let Some(object) = slot.take() {
                self.events.push(GhostEvent::Deleted {
                    index: index as GhostIndex,
                    object,
                });
            }
        }
        self.save_list.clear();
    }

    // Save list

    pub fn push_saved(&mut self, saved: SavedGhost) {
        self.save_list.push_back(saved);
    }

    pub fn save_list_len(&self) -> usize {
        self.save_list.len()
    }

    pub fn front_saved(&self) -> Option<&SavedGhost> {
        self.save_list.front()
    }

    pub fn pop_saved(&mut self) -> Option<SavedGhost> {
        self.save_list.pop_front()
    }

    // Packets

    /// Reads the ghost section of a packet. Every update is decoded into a
    /// copy, so a failure leaves the ghost at its last good state.
    pub fn read_packet(&mut self, reader: &mut BitReader, context: &UnpackContext) -> Result<(), SerdeErr> {
        if !reader.read_bit()? {
            return Ok(());
        }
        let index_bits = read_bits(reader, GHOST_INDEX_BIT_SIZE)? as u8 + 3;
        if index_bits > GHOST_ID_BIT_SIZE {
            return Err(SerdeErr);
        }

        while reader.read_bit()? {
            let index = read_bits(reader, index_bits)? as GhostIndex;
            let slot = index as usize;

            if reader.read_bit()? {
                let has_final_update = reader.read_bit()?;
                let Some(current) = self.local_ghosts[slot].as_ref() else {
                    if has_final_update {
                        return Err(SerdeErr);
                    }
                    warn!("GhostReceiver: kill for unknown ghost {}", index);
                    continue;
                };
                let mut object = current.clone_box();
                if has_final_update {
                    object.unpack_update(context, reader)?;
                }
                self.local_ghosts[slot] = None;
                self.events.push(GhostEvent::Deleted { index, object });
                continue;
            }

            match self.local_ghosts[slot].as_ref() {
                None => {
                    let kinds = &context.protocol.object_kinds;
                    let class_id = kinds.read_class_id(reader)?;
                    let Some(mut object) = kinds.create(class_id) else {
                        warn!("GhostReceiver: unknown object class id {}", class_id);
                        return Err(SerdeErr);
                    };
                    object.unpack_update(context, reader)?;
                    self.local_ghosts[slot] = Some(object);
                    self.events.push(GhostEvent::Created { index });
                }
                Some(current) => {
                    let mut object = current.clone_box();
                    object.unpack_update(context, reader)?;
                    self.local_ghosts[slot] = Some(object);
                    self.events.push(GhostEvent::Updated { index });
                }
            }
        }
        Ok(())
    }

    // Demo

    pub fn write_demo_start_block(&self, writer: &mut dyn BitWrite, context: &PackContext) {
        let kinds = &context.protocol.object_kinds;
        self.ghosting_sequence.ser(writer);

        let ghosts: Vec<(GhostIndex, &dyn Replicable)> = self
            .iter()
            .filter(|(_, object)| kinds.class_id_of(*object).is_some())
            .collect();
        for (index, object) in &ghosts {
            writer.write_bit(true);
            write_bits(writer, u32::from(*index), GHOST_ID_BIT_SIZE);
            if let Some(class_id) = kinds.class_id_of(*object) {
                kinds.write_class_id(writer, class_id);
            }
        }
        writer.write_bit(false);

        for (_, object) in &ghosts {
            object.pack_update(context, FULL_UPDATE_MASK, writer);
        }
    }

    pub fn read_demo_start_block(
        &mut self,
        reader: &mut BitReader,
        context: &UnpackContext,
    ) -> Result<(), SerdeErr> {
        let kinds = &context.protocol.object_kinds;
        self.ghosting_sequence = u32::de(reader)?;

        let mut created = Vec::new();
        while reader.read_bit()? {
            let index = read_bits(reader, GHOST_ID_BIT_SIZE)? as GhostIndex;
            let class_id = kinds.read_class_id(reader)?;
            let object = kinds.create(class_id).ok_or(SerdeErr)?;
            created.push((index, object));
        }

        for (index, mut object) in created {
            object.unpack_update(context, reader)?;
            self.install(index, object);
        }
        Ok(())
    }
}

impl Default for GhostReceiver {
    fn default() -> Self {
        Self::new()
    }
}
