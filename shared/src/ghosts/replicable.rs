use std::any::Any;

use ghostnet_serde::{BitReader, BitWrite, SerdeErr};

use crate::pack_context::{PackContext, UnpackContext};

/// An object whose state can be ghosted to remote connections.
///
/// State is split into up to 32 independently dirtied parts, one bit of the
/// update mask each. `pack_update` writes the parts named by `mask` and
/// returns the bits it could not write, which stay dirty.
pub trait Replicable: Any {
    fn pack_update(&self, context: &PackContext, mask: u32, writer: &mut dyn BitWrite) -> u32;

    fn unpack_update(&mut self, context: &UnpackContext, reader: &mut BitReader) -> Result<(), SerdeErr>;

    /// Higher priorities are written first when a packet cannot hold every
    /// dirty ghost. `update_skips` counts the send passes since the ghost was
    /// last written, so the default never starves anyone.
    fn update_priority(&self, _mask: u32, update_skips: u32) -> f32 {
        update_skips as f32 * 0.1
    }

    /// Files the receiving side must hold before a scope-always copy of this
    /// object can be installed
    fn required_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn Replicable>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
