use log::warn;

use crate::{
    events::{event_kinds::EventKinds, net_event::NetEventRead},
    ghosts::{object_kinds::ObjectKinds, replicable::Replicable},
};

pub mod error;
pub use error::ProtocolError;

/// Class ids of one kind family must fit the widest id field
const MAX_KINDS: usize = 1 << 10;

// Protocol Plugin
pub trait ProtocolPlugin {
    fn build(&self, protocol: &mut Protocol);
}

// Protocol
pub struct Protocol {
    pub event_kinds: EventKinds,
    pub object_kinds: ObjectKinds,
    /// Stamped into demo recordings; a demo only replays under the same version
    pub protocol_version: u32,
    /// Both ends of a connection must agree on this value
    pub net_class_group: u32,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            event_kinds: EventKinds::new(),
            object_kinds: ObjectKinds::new(),
            protocol_version: 1,
            net_class_group: 0,
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> &mut Self {
        self.check_lock();
        plugin.build(self);
        self
    }

    pub fn protocol_version(&mut self, version: u32) -> &mut Self {
        self.check_lock();
        self.protocol_version = version;
        self
    }

    pub fn net_class_group(&mut self, group: u32) -> &mut Self {
        self.check_lock();
        self.net_class_group = group;
        self
    }

    pub fn add_event<E: NetEventRead>(&mut self) -> &mut Self {
        self.check_lock();
        if !self.event_kinds.add_event::<E>() {
            warn!("Protocol: event {} registered twice", std::any::type_name::<E>());
        }
        self
    }

    pub fn add_object<R: Replicable + Default>(&mut self) -> &mut Self {
        self.check_lock();
        if !self.object_kinds.add_object::<R>() {
            warn!("Protocol: object {} registered twice", std::any::type_name::<R>());
        }
        self
    }

    // Non-panicking builder methods

    pub fn try_add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        plugin.build(self);
        Ok(self)
    }

    pub fn try_protocol_version(&mut self, version: u32) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.protocol_version = version;
        Ok(self)
    }

    pub fn try_net_class_group(&mut self, group: u32) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.net_class_group = group;
        Ok(self)
    }

    pub fn try_add_event<E: NetEventRead>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        let name = std::any::type_name::<E>();
        let count = self.event_kinds.len();
        if count >= MAX_KINDS {
            return Err(ProtocolError::TooManyKinds { name, count });
        }
        if !self.event_kinds.add_event::<E>() {
            return Err(ProtocolError::DuplicateKind { name });
        }
        Ok(self)
    }

    pub fn try_add_object<R: Replicable + Default>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        let name = std::any::type_name::<R>();
        let count = self.object_kinds.len();
        if count >= MAX_KINDS {
            return Err(ProtocolError::TooManyKinds { name, count });
        }
        if !self.object_kinds.add_object::<R>() {
            return Err(ProtocolError::DuplicateKind { name });
        }
        Ok(self)
    }

    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.locked = true;
        Ok(())
    }

    pub fn lock(&mut self) {
        self.check_lock();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks if protocol is locked without panicking
    /// Returns Err if protocol is locked
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Checks if protocol is locked, panics if it is
    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Checksum over every registered kind, in class id order. Peers built
    /// from different protocols refuse each other's connect requests.
    pub fn class_crc(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&(self.event_kinds.len() as u32).to_le_bytes());
        for name in self.event_kinds.names() {
            crc.update(name.as_bytes());
            crc.update(&[0]);
        }
        crc.update(&(self.object_kinds.len() as u32).to_le_bytes());
        for name in self.object_kinds.names() {
            crc.update(name.as_bytes());
            crc.update(&[0]);
        }
        crc.finish()
    }
}

// IEEE CRC-32, bitwise
struct Crc32 {
    value: u32,
}

impl Crc32 {
    const POLYNOMIAL: u32 = 0xEDB8_8320;

    fn new() -> Self {
        Self { value: u32::MAX }
    }

    fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.value ^= u32::from(*byte);
            for _ in 0..8 {
                let mask = (self.value & 1).wrapping_neg();
                self.value = (self.value >> 1) ^ (Self::POLYNOMIAL & mask);
            }
        }
    }

    fn finish(&self) -> u32 {
        !self.value
    }
}
