use std::collections::{HashMap, VecDeque};

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};
use log::warn;

use crate::constants::{STRING_ENTRY_BIT_SIZE, STRING_TABLE_SIZE};

struct SendEntry {
    string: String,
    confirmed: bool,
}

/// Result of looking a string up for sending
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringLookup {
    /// The peer has acknowledged this entry; the index alone may be sent
    Confirmed(u16),
    /// The entry exists (or was just created) but the peer may not know it yet
    Pending { index: u16, is_new: bool },
}

/// Per-connection mapping between strings and small indices.
///
/// The sending half hands out indices on demand, recycling the least recently
/// used entry when full. The receiving half only mirrors what the peer has
/// announced.
pub struct StringTable {
    send_entries: Vec<Option<SendEntry>>,
    send_lookup: HashMap<String, u16>,
    lru: VecDeque<u16>,
    recv_entries: Vec<Option<String>>,
}

impl StringTable {
    pub fn new() -> Self {
        let mut send_entries = Vec::with_capacity(STRING_TABLE_SIZE);
        let mut recv_entries = Vec::with_capacity(STRING_TABLE_SIZE);
        for _ in 0..STRING_TABLE_SIZE {
            send_entries.push(None);
            recv_entries.push(None);
        }
        Self {
            send_entries,
            send_lookup: HashMap::new(),
            lru: (0..STRING_TABLE_SIZE as u16).collect(),
            recv_entries,
        }
    }

    // Sending

    /// Finds or allocates the index for `string`. A new entry must be
    /// announced to the peer before the index can be used alone.
    pub fn check_string(&mut self, string: &str) -> StringLookup {
        if let Some(index) = self.send_lookup.get(string).copied() {
            self.touch(index);
            let confirmed = self.send_entries[index as usize]
                .as_ref()
                .map(|entry| entry.confirmed)
                .unwrap_or(false);
            if confirmed {
                return StringLookup::Confirmed(index);
            }
            return StringLookup::Pending {
                index,
                is_new: false,
            };
        }

        let Some(index) = self.lru.pop_front() else {
            return StringLookup::Pending {
                index: 0,
                is_new: true,
            };
        };
        if let Some(old) = self.send_entries[index as usize].take() {
            self.send_lookup.remove(&old.string);
        }
        self.send_entries[index as usize] = Some(SendEntry {
            string: string.to_string(),
            confirmed: false,
        });
        self.send_lookup.insert(string.to_string(), index);
        self.lru.push_back(index);

        StringLookup::Pending {
            index,
            is_new: true,
        }
    }

    /// Index of `string` if the peer is known to have it
    pub fn confirmed_index(&self, string: &str) -> Option<u16> {
        let index = *self.send_lookup.get(string)?;
        let entry = self.send_entries[index as usize].as_ref()?;
        entry.confirmed.then_some(index)
    }

    /// Called once the announcement of `string` at `index` is acknowledged.
    /// Ignored if the entry was recycled in the meantime.
    pub fn confirm(&mut self, index: u16, string: &str) {
        if let Some(Some(entry)) = self.send_entries.get_mut(index as usize) {
            if entry.string == string {
                entry.confirmed = true;
            }
        }
    }

    fn touch(&mut self, index: u16) {
        if let Some(position) = self.lru.iter().position(|old| *old == index) {
            self.lru.remove(position);
        }
        self.lru.push_back(index);
    }

    // Receiving

    pub fn map_string(&mut self, index: u16, string: String) {
        match self.recv_entries.get_mut(index as usize) {
            Some(slot) => *slot = Some(string),
            None => warn!("StringTable: ignoring out of range index {}", index),
        }
    }

    pub fn lookup_string(&self, index: u16) -> Option<&str> {
        self.recv_entries.get(index as usize)?.as_deref()
    }

    // Demo

    pub fn write_demo_start_block(&self, writer: &mut dyn BitWrite) {
        for (index, entry) in self.recv_entries.iter().enumerate() {
            if let Some(string) = entry {
                writer.write_bit(true);
                write_bits(writer, index as u32, STRING_ENTRY_BIT_SIZE);
                string.ser(writer);
            }
        }
        writer.write_bit(false);
    }

    pub fn read_demo_start_block(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        while reader.read_bit()? {
            let index = read_bits(reader, STRING_ENTRY_BIT_SIZE)? as u16;
            let string = String::de(reader)?;
            self.map_string(index, string);
        }
        Ok(())
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}
