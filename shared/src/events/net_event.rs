use std::any::Any;

use ghostnet_serde::{BitReader, BitWrite, SerdeErr};

use crate::{
    pack_context::{PackContext, UnpackContext},
    types::{EventSequence, HostType},
};

/// Delivery guarantee of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Guarantee {
    /// Retransmitted until acknowledged, processed in posting order
    GuaranteedOrdered,
    /// Retransmitted until acknowledged, processed on arrival
    Guaranteed,
    /// Sent once; `notify_delivered(false)` reports a loss
    Unguaranteed,
}

/// Which side of a connection may send an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventDirection {
    Any,
    ServerToClient,
    ClientToServer,
}

impl EventDirection {
    pub fn can_send_from(&self, host_type: HostType) -> bool {
        match self {
            EventDirection::Any => true,
            EventDirection::ServerToClient => host_type == HostType::Server,
            EventDirection::ClientToServer => host_type == HostType::Client,
        }
    }

    pub fn can_receive_at(&self, host_type: HostType) -> bool {
        self.can_send_from(host_type.invert())
    }
}

/// A self-describing message sent over a connection.
///
/// Events are registered with the [`Protocol`](crate::Protocol), which gives
/// each kind a class id. The receiving side rebuilds them with
/// [`NetEventRead::unpack`].
pub trait NetEvent: Any {
    fn guarantee(&self) -> Guarantee {
        Guarantee::GuaranteedOrdered
    }

    fn direction(&self) -> EventDirection {
        EventDirection::Any
    }

    fn pack(&self, context: &PackContext, writer: &mut dyn BitWrite);

    /// Called once the event has been written into an outgoing packet
    fn notify_sent(&mut self) {}

    /// Called once the fate of the packet carrying the event is known.
    /// Guaranteed events only ever see `true`.
    fn notify_delivered(&mut self, _delivered: bool) {}

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

pub trait NetEventRead: NetEvent + Sized {
    fn unpack(context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr>;
}

/// An event waiting for the packet that carried it to be resolved
pub struct EventNote {
    pub sequence: Option<EventSequence>,
    pub event: Box<dyn NetEvent>,
}

impl EventNote {
    pub fn new(sequence: Option<EventSequence>, event: Box<dyn NetEvent>) -> Self {
        Self { sequence, event }
    }
}

pub fn event_is<E: NetEvent>(event: &dyn NetEvent) -> bool {
    event.as_any().is::<E>()
}

/// Callers check the concrete type with [`event_is`] first
pub fn downcast_event<E: NetEvent>(event: Box<dyn NetEvent>) -> Option<Box<E>> {
    event.into_any().downcast::<E>().ok()
}
