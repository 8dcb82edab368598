use std::collections::VecDeque;

use thiserror::Error;

use crate::{sequence_less_than, types::EventSequence};

/// Errors that can occur during SequenceList operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Attempted to insert a sequence that is already held by the list
    #[error("Duplicate sequence {sequence} not allowed in SequenceList")]
    DuplicateSequence { sequence: EventSequence },
}

/// Items kept sorted by their (wrapping) event sequence.
///
/// Insertions scan from the back, since new items almost always belong at
/// the end.
pub struct SequenceList<T> {
    list: VecDeque<(EventSequence, T)>,
}

impl<T> SequenceList<T> {
    pub fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front_sequence(&self) -> Option<EventSequence> {
        self.list.front().map(|(sequence, _)| *sequence)
    }

    pub fn pop_front(&mut self) -> Option<(EventSequence, T)> {
        self.list.pop_front()
    }

    /// Removes the front item only if it carries `sequence`
    pub fn pop_front_if(&mut self, sequence: EventSequence) -> Option<T> {
        if self.front_sequence() == Some(sequence) {
            return self.list.pop_front().map(|(_, item)| item);
        }
        None
    }

    pub fn contains(&self, sequence: EventSequence) -> bool {
        self.list.iter().rev().any(|(old, _)| *old == sequence)
    }

    pub fn try_insert(&mut self, sequence: EventSequence, item: T) -> Result<(), SequenceError> {
        let mut index = self.list.len();

        while index > 0 {
            let old = self.list[index - 1].0;
            if old == sequence {
                return Err(SequenceError::DuplicateSequence { sequence });
            }
            if sequence_less_than(old, sequence) {
                break;
            }
            index -= 1;
        }

        self.list.insert(index, (sequence, item));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(EventSequence, T)> {
        self.list.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (EventSequence, T)> + '_ {
        self.list.drain(..)
    }
}

impl<T> Default for SequenceList<T> {
    fn default() -> Self {
        Self::new()
    }
}
