/// Events and replicated objects shared by the end-to-end tests
use std::{any::Any, sync::Arc};

use ghostnet_shared::{
    BitReader, BitWrite, EventDirection, Guarantee, NetEvent, NetEventRead, PackContext, Protocol,
    ProtocolPlugin, Replicable, Serde, SerdeErr, UnpackContext,
};

pub const TEST_PROTOCOL_VERSION: u32 = 3;

/// A chat line on a named channel; the channel goes through the string table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(channel: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            text: text.to_string(),
        }
    }
}

impl NetEvent for ChatMessage {
    fn pack(&self, context: &PackContext, writer: &mut dyn BitWrite) {
        context.pack_net_string(writer, Some(&self.channel));
        self.text.ser(writer);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for ChatMessage {
    fn unpack(context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let channel = context.unpack_net_string(reader)?.ok_or(SerdeErr)?;
        let text = String::de(reader)?;
        Ok(Self { channel, text })
    }
}

/// A counter value with a chosen guarantee, sent from the server only
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Numbered {
    pub value: u32,
    pub guarantee: Guarantee,
}

impl Numbered {
    pub fn ordered(value: u32) -> Self {
        Self {
            value,
            guarantee: Guarantee::GuaranteedOrdered,
        }
    }

    pub fn unordered(value: u32) -> Self {
        Self {
            value,
            guarantee: Guarantee::Guaranteed,
        }
    }

    pub fn unguaranteed(value: u32) -> Self {
        Self {
            value,
            guarantee: Guarantee::Unguaranteed,
        }
    }
}

impl NetEvent for Numbered {
    fn guarantee(&self) -> Guarantee {
        self.guarantee
    }

    fn direction(&self) -> EventDirection {
        EventDirection::ServerToClient
    }

    fn pack(&self, _context: &PackContext, writer: &mut dyn BitWrite) {
        self.value.ser(writer);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for Numbered {
    fn unpack(_context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            value: u32::de(reader)?,
            // the receiver only sees the payload
            guarantee: Guarantee::Guaranteed,
        })
    }
}

/// A moving object with two independently dirtied parts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const X_MASK: u32 = 1 << 0;
    pub const Y_MASK: u32 = 1 << 1;

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Replicable for Position {
    fn pack_update(&self, _context: &PackContext, mask: u32, writer: &mut dyn BitWrite) -> u32 {
        let write_x = mask & Self::X_MASK != 0;
        write_x.ser(writer);
        if write_x {
            self.x.ser(writer);
        }
        let write_y = mask & Self::Y_MASK != 0;
        write_y.ser(writer);
        if write_y {
            self.y.ser(writer);
        }
        0
    }

    fn unpack_update(&mut self, _context: &UnpackContext, reader: &mut BitReader) -> Result<(), SerdeErr> {
        if bool::de(reader)? {
            self.x = i32::de(reader)?;
        }
        if bool::de(reader)? {
            self.y = i32::de(reader)?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Replicable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A scope-always object that cannot be installed without its data file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Level {
    pub name: String,
}

impl Level {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.lvl", self.name)
    }
}

impl Replicable for Level {
    fn pack_update(&self, _context: &PackContext, _mask: u32, writer: &mut dyn BitWrite) -> u32 {
        self.name.ser(writer);
        0
    }

    fn unpack_update(&mut self, _context: &UnpackContext, reader: &mut BitReader) -> Result<(), SerdeErr> {
        self.name = String::de(reader)?;
        Ok(())
    }

    fn required_files(&self) -> Vec<String> {
        vec![self.file_name()]
    }

    fn clone_box(&self) -> Box<dyn Replicable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct TestPlugin;

impl ProtocolPlugin for TestPlugin {
    fn build(&self, protocol: &mut Protocol) {
        protocol
            .protocol_version(TEST_PROTOCOL_VERSION)
            .add_event::<ChatMessage>()
            .add_event::<Numbered>()
            .add_object::<Position>()
            .add_object::<Level>();
    }
}

pub fn protocol() -> Arc<Protocol> {
    let mut protocol = Protocol::builder();
    protocol.add_plugin(TestPlugin);
    Arc::new(protocol.build())
}

/// The test protocol under another net class group, which peers refuse
pub fn protocol_in_group(group: u32) -> Arc<Protocol> {
    let mut protocol = Protocol::builder();
    protocol.add_plugin(TestPlugin).net_class_group(group);
    Arc::new(protocol.build())
}
