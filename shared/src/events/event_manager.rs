use std::collections::VecDeque;

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, BitWriter, Serde, SerdeErr, StreamWriter};
use log::{trace, warn};

use crate::{
    constants::{EVENT_SEND_WINDOW, EVENT_SEQUENCE_BIT_SIZE, EVENT_SEQUENCE_MASK},
    events::{
        error::EventError,
        net_event::{event_is, EventNote, Guarantee, NetEvent},
        net_string_event::NetStringEvent,
    },
    pack_context::{PackContext, UnpackContext},
    sequence_less_than,
    sequence_list::SequenceList,
    strings::string_table::StringTable,
    types::{EventSequence, HostType},
    wrapping_diff, Protocol,
};

/// Events decoded from one packet, in the order they should be processed,
/// plus the protocol error that stopped decoding, if any
#[derive(Default)]
pub struct EventReadOutcome {
    pub events: Vec<Box<dyn NetEvent>>,
    pub error: Option<String>,
}

/// Queues, sequences and retransmits the events of one connection
pub struct EventManager {
    host_type: HostType,
    sending_events: bool,
    unordered_send_queue: VecDeque<Box<dyn NetEvent>>,
    ordered_send_queue: SequenceList<Box<dyn NetEvent>>,
    // acknowledged ordered events waiting for an earlier one to be acknowledged
    notify_list: SequenceList<Box<dyn NetEvent>>,
    // received ordered events waiting for an earlier one to arrive
    wait_list: SequenceList<Box<dyn NetEvent>>,
    next_send_sequence: EventSequence,
    next_recv_sequence: EventSequence,
    last_acked_sequence: EventSequence,
}

impl EventManager {
    pub fn new(host_type: HostType) -> Self {
        Self {
            host_type,
            sending_events: true,
            unordered_send_queue: VecDeque::new(),
            ordered_send_queue: SequenceList::new(),
            notify_list: SequenceList::new(),
            wait_list: SequenceList::new(),
            next_send_sequence: 0,
            next_recv_sequence: 0,
            last_acked_sequence: EventSequence::MAX,
        }
    }

    pub fn set_sending_events(&mut self, sending: bool) {
        self.sending_events = sending;
    }

    pub fn is_sending_events(&self) -> bool {
        self.sending_events
    }

    /// Events queued but not yet written into a packet
    pub fn pending_count(&self) -> usize {
        self.unordered_send_queue.len() + self.ordered_send_queue.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.wait_list.len()
    }

    pub fn post(&mut self, event: Box<dyn NetEvent>, protocol: &Protocol) -> Result<(), EventError> {
        if !self.sending_events {
            return Err(EventError::SendingDisabled);
        }
        if !event.direction().can_send_from(self.host_type) {
            return Err(EventError::WrongDirection);
        }
        if protocol.event_kinds.class_id_of(event.as_ref()).is_none() {
            return Err(EventError::UnregisteredEvent);
        }

        if event.guarantee() == Guarantee::GuaranteedOrdered {
            let sequence = self.next_send_sequence;
            self.next_send_sequence = self.next_send_sequence.wrapping_add(1);
            if let Err(error) = self.ordered_send_queue.try_insert(sequence, event) {
                warn!("EventManager: {}", error);
            }
        } else {
            self.unordered_send_queue.push_back(event);
        }
        Ok(())
    }

    /// Writes as many queued events as fit, unordered ones first. The returned
    /// notes belong to the packet being built.
    pub fn write_packet(&mut self, writer: &mut BitWriter, context: &PackContext) -> Vec<EventNote> {
        let kinds = &context.protocol.event_kinds;
        let mut notes = Vec::new();

        // room for both phase terminators
        writer.reserve_bits(2);

        while let Some(mut event) = self.unordered_send_queue.pop_front() {
            let Some(class_id) = kinds.class_id_of(event.as_ref()) else {
                warn!("EventManager: dropping unregistered event");
                continue;
            };

            let mut staged = StreamWriter::new();
            staged.write_bit(true);
            kinds.write_class_id(&mut staged, class_id);
            event.pack(context, &mut staged);

            if staged.bits_written() > writer.bits_free() {
                self.unordered_send_queue.push_front(event);
                break;
            }
            staged.copy_into(writer);
            event.notify_sent();
            notes.push(EventNote::new(None, event));
        }
        writer.release_bits(1);
        writer.write_bit(false);

        let mut previous: Option<EventSequence> = None;
        while let Some(sequence) = self.ordered_send_queue.front_sequence() {
            if wrapping_diff(self.last_acked_sequence, sequence) > EVENT_SEND_WINDOW as i16 {
                break;
            }
            let Some((sequence, mut event)) = self.ordered_send_queue.pop_front() else {
                break;
            };
            let Some(class_id) = kinds.class_id_of(event.as_ref()) else {
                warn!("EventManager: dropping unregistered event");
                continue;
            };

            let mut staged = StreamWriter::new();
            staged.write_bit(true);
            if previous == Some(sequence.wrapping_sub(1)) {
                staged.write_bit(true);
            } else {
                staged.write_bit(false);
                write_bits(
                    &mut staged,
                    u32::from(sequence & EVENT_SEQUENCE_MASK),
                    EVENT_SEQUENCE_BIT_SIZE,
                );
            }
            kinds.write_class_id(&mut staged, class_id);
            event.pack(context, &mut staged);

            if staged.bits_written() > writer.bits_free() {
                if let Err(error) = self.ordered_send_queue.try_insert(sequence, event) {
                    warn!("EventManager: {}", error);
                }
                break;
            }
            staged.copy_into(writer);
            event.notify_sent();
            previous = Some(sequence);
            notes.push(EventNote::new(Some(sequence), event));
        }
        writer.release_bits(1);
        writer.write_bit(false);

        notes
    }

    /// Decodes the event section of a packet. Unordered events come back in
    /// arrival order, followed by every ordered event that is now in sequence.
    pub fn read_packet(
        &mut self,
        reader: &mut BitReader,
        protocol: &Protocol,
        strings: &mut Option<StringTable>,
    ) -> EventReadOutcome {
        let mut outcome = EventReadOutcome::default();

        if self.read_events(reader, protocol, strings, &mut outcome.events).is_err() {
            outcome.error = Some("Invalid packet.".to_string());
            return outcome;
        }

        while let Some(event) = self.wait_list.pop_front_if(self.next_recv_sequence) {
            self.next_recv_sequence = self.next_recv_sequence.wrapping_add(1);
            outcome.events.push(event);
        }

        outcome
    }

    fn read_events(
        &mut self,
        reader: &mut BitReader,
        protocol: &Protocol,
        strings: &mut Option<StringTable>,
        unordered: &mut Vec<Box<dyn NetEvent>>,
    ) -> Result<(), SerdeErr> {
        let kinds = &protocol.event_kinds;
        let mut unordered_phase = true;
        let mut previous: Option<EventSequence> = None;

        loop {
            let mut has_event = reader.read_bit()?;
            if unordered_phase && !has_event {
                unordered_phase = false;
                has_event = reader.read_bit()?;
            }
            if !has_event {
                return Ok(());
            }

            let sequence = if unordered_phase {
                None
            } else {
                let sequence = if reader.read_bit()? {
                    previous.ok_or(SerdeErr)?.wrapping_add(1) & EVENT_SEQUENCE_MASK
                } else {
                    read_bits(reader, EVENT_SEQUENCE_BIT_SIZE)? as EventSequence
                };
                previous = Some(sequence);
                Some(sequence)
            };

            let event = {
                let context = UnpackContext {
                    protocol,
                    strings: strings.as_ref(),
                    host_type: self.host_type,
                };
                let class_id = kinds.read_class_id(reader)?;
                kinds.read(class_id, &context, reader)?
            };

            if !event.direction().can_receive_at(self.host_type) {
                warn!("EventManager: received an event travelling in the wrong direction");
                return Err(SerdeErr);
            }

            // string entries are usable as soon as they arrive
            if event_is::<NetStringEvent>(event.as_ref()) {
                if let (Some(table), Some(announce)) = (
                    strings.as_mut(),
                    event.as_any().downcast_ref::<NetStringEvent>(),
                ) {
                    table.map_string(announce.index, announce.string.clone());
                }
            }

            let Some(sequence) = sequence else {
                unordered.push(event);
                continue;
            };

            let mut full = (self.next_recv_sequence & !EVENT_SEQUENCE_MASK) | sequence;
            if sequence_less_than(full, self.next_recv_sequence) {
                full = full.wrapping_add(EVENT_SEQUENCE_MASK + 1);
            }
            if let Err(error) = self.wait_list.try_insert(full, event) {
                trace!("EventManager: {}", error);
            }
        }
    }

    /// The packet carrying `notes` arrived. Returns every event whose
    /// delivery is now confirmed, in order.
    pub fn packet_received(&mut self, notes: Vec<EventNote>) -> Vec<Box<dyn NetEvent>> {
        let mut delivered = Vec::new();

        for note in notes {
            match note.sequence {
                Some(sequence) => {
                    if let Err(error) = self.notify_list.try_insert(sequence, note.event) {
                        warn!("EventManager: {}", error);
                    }
                }
                None => {
                    let mut event = note.event;
                    event.notify_delivered(true);
                    delivered.push(event);
                }
            }
        }

        while let Some(mut event) = self
            .notify_list
            .pop_front_if(self.last_acked_sequence.wrapping_add(1))
        {
            self.last_acked_sequence = self.last_acked_sequence.wrapping_add(1);
            event.notify_delivered(true);
            delivered.push(event);
        }

        delivered
    }

    /// The packet carrying `notes` was lost. Guaranteed events are queued for
    /// resending; unguaranteed ones are returned after being told of the loss.
    pub fn packet_dropped(&mut self, notes: Vec<EventNote>) -> Vec<Box<dyn NetEvent>> {
        let mut lost = Vec::new();

        for note in notes.into_iter().rev() {
            let mut event = note.event;
            match (note.sequence, event.guarantee()) {
                (Some(sequence), _) => {
                    if let Err(error) = self.ordered_send_queue.try_insert(sequence, event) {
                        warn!("EventManager: {}", error);
                    }
                }
                (None, Guarantee::Unguaranteed) => {
                    event.notify_delivered(false);
                    lost.push(event);
                }
                (None, _) => {
                    self.unordered_send_queue.push_front(event);
                }
            }
        }

        lost.reverse();
        lost
    }

    pub fn clear(&mut self) {
        self.unordered_send_queue.clear();
        self.ordered_send_queue = SequenceList::new();
        self.notify_list = SequenceList::new();
        self.wait_list = SequenceList::new();
    }

    // Demo

    pub fn write_demo_start_block(&self, writer: &mut dyn BitWrite, context: &PackContext) {
        let kinds = &context.protocol.event_kinds;
        self.next_recv_sequence.ser(writer);
        for (sequence, event) in self.wait_list.iter() {
            let Some(class_id) = kinds.class_id_of(event.as_ref()) else {
                continue;
            };
            writer.write_bit(true);
            kinds.write_class_id(writer, class_id);
            sequence.ser(writer);
            event.pack(context, writer);
        }
        writer.write_bit(false);
    }

    pub fn read_demo_start_block(
        &mut self,
        reader: &mut BitReader,
        context: &UnpackContext,
    ) -> Result<(), SerdeErr> {
        let kinds = &context.protocol.event_kinds;
        self.next_recv_sequence = EventSequence::de(reader)?;
        while reader.read_bit()? {
            let class_id = kinds.read_class_id(reader)?;
            let sequence = EventSequence::de(reader)?;
            let event = kinds.read(class_id, context, reader)?;
            if let Err(error) = self.wait_list.try_insert(sequence, event) {
                warn!("EventManager: {}", error);
            }
        }
        Ok(())
    }
}
