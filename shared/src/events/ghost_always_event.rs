use std::any::Any;

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, SerdeErr};
use log::warn;

use crate::{
    constants::{FULL_UPDATE_MASK, GHOST_ID_BIT_SIZE},
    events::net_event::{EventDirection, NetEvent, NetEventRead},
    ghosts::{object_registry::ObjectId, replicable::Replicable},
    pack_context::{PackContext, UnpackContext},
    types::GhostIndex,
};

/// Delivers one scope-always object, with its full state, ahead of normal
/// ghosting
pub struct GhostAlwaysObjectEvent {
    pub ghost_index: GhostIndex,
    /// Set on the sending side
    pub object_id: Option<ObjectId>,
    /// Set on the receiving side
    pub object: Option<Box<dyn Replicable>>,
}

impl GhostAlwaysObjectEvent {
    pub fn new(object_id: ObjectId, ghost_index: GhostIndex) -> Self {
        Self {
            ghost_index,
            object_id: Some(object_id),
            object: None,
        }
    }
}

impl NetEvent for GhostAlwaysObjectEvent {
    fn direction(&self) -> EventDirection {
        EventDirection::ServerToClient
    }

    fn pack(&self, context: &PackContext, writer: &mut dyn BitWrite) {
        write_bits(writer, u32::from(self.ghost_index), GHOST_ID_BIT_SIZE);

        let object = self.object_id.and_then(|id| context.objects.get(id));
        let class_id = object.and_then(|object| context.protocol.object_kinds.class_id_of(object));
        match (object, class_id) {
            (Some(object), Some(class_id)) => {
                writer.write_bit(true);
                context.protocol.object_kinds.write_class_id(writer, class_id);
                object.pack_update(context, FULL_UPDATE_MASK, writer);
            }
            _ => {
                // removed before it could be sent
                writer.write_bit(false);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for GhostAlwaysObjectEvent {
    fn unpack(context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let ghost_index = read_bits(reader, GHOST_ID_BIT_SIZE)? as GhostIndex;
        if !reader.read_bit()? {
            return Ok(Self {
                ghost_index,
                object_id: None,
                object: None,
            });
        }

        let kinds = &context.protocol.object_kinds;
        let class_id = kinds.read_class_id(reader)?;
        let Some(mut object) = kinds.create(class_id) else {
            warn!("GhostAlwaysObjectEvent: unknown object class id {}", class_id);
            return Err(SerdeErr);
        };
        object.unpack_update(context, reader)?;

        Ok(Self {
            ghost_index,
            object_id: None,
            object: Some(object),
        })
    }
}
