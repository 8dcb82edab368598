use std::{
    any::{type_name, TypeId},
    collections::HashMap,
};

use ghostnet_serde::{bits_required, read_bits, write_bits, BitReader, BitWrite, SerdeErr};

use crate::{
    events::{
        connection_message::ConnectionMessageEvent,
        file_events::{FileChunkEvent, FileDownloadRequestEvent},
        ghost_always_event::GhostAlwaysObjectEvent,
        net_event::{NetEvent, NetEventRead},
        net_string_event::NetStringEvent,
    },
    pack_context::UnpackContext,
    types::ClassId,
};

type UnpackFn = fn(&UnpackContext, &mut BitReader) -> Result<Box<dyn NetEvent>, SerdeErr>;

fn unpack_boxed<E: NetEventRead>(
    context: &UnpackContext,
    reader: &mut BitReader,
) -> Result<Box<dyn NetEvent>, SerdeErr> {
    Ok(Box::new(E::unpack(context, reader)?))
}

struct EventEntry {
    name: &'static str,
    unpack: UnpackFn,
}

/// Registry of event types, assigning each a class id in registration order
pub struct EventKinds {
    class_ids: HashMap<TypeId, ClassId>,
    entries: Vec<EventEntry>,
}

impl EventKinds {
    /// Creates a registry already holding the connection's own events
    pub fn new() -> Self {
        let mut kinds = Self {
            class_ids: HashMap::new(),
            entries: Vec::new(),
        };
        kinds.add_event::<ConnectionMessageEvent>();
        kinds.add_event::<GhostAlwaysObjectEvent>();
        kinds.add_event::<NetStringEvent>();
        kinds.add_event::<FileDownloadRequestEvent>();
        kinds.add_event::<FileChunkEvent>();
        kinds
    }

    /// Returns false if `E` was already registered
    pub fn add_event<E: NetEventRead>(&mut self) -> bool {
        let type_id = TypeId::of::<E>();
        if self.class_ids.contains_key(&type_id) {
            return false;
        }
        let class_id = self.entries.len() as ClassId;
        self.class_ids.insert(type_id, class_id);
        self.entries.push(EventEntry {
            name: type_name::<E>(),
            unpack: unpack_boxed::<E>,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_id_of(&self, event: &dyn NetEvent) -> Option<ClassId> {
        self.class_ids.get(&event.as_any().type_id()).copied()
    }

    pub fn class_id<E: NetEvent>(&self) -> Option<ClassId> {
        self.class_ids.get(&TypeId::of::<E>()).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    /// Width of a class id on the wire
    pub fn bit_size(&self) -> u8 {
        bits_required(self.entries.len() as u32)
    }

    pub fn write_class_id(&self, writer: &mut dyn BitWrite, class_id: ClassId) {
        write_bits(writer, u32::from(class_id), self.bit_size());
    }

    pub fn read_class_id(&self, reader: &mut BitReader) -> Result<ClassId, SerdeErr> {
        Ok(read_bits(reader, self.bit_size())? as ClassId)
    }

    /// Rebuilds an event of kind `class_id`. Unknown ids are malformed data.
    pub fn read(
        &self,
        class_id: ClassId,
        context: &UnpackContext,
        reader: &mut BitReader,
    ) -> Result<Box<dyn NetEvent>, SerdeErr> {
        let entry = self.entries.get(class_id as usize).ok_or(SerdeErr)?;
        (entry.unpack)(context, reader)
    }
}

impl Default for EventKinds {
    fn default() -> Self {
        Self::new()
    }
}
