use std::time::Instant;

/// A millisecond timestamp that wraps at `u32::MAX`.
///
/// Every time-dependent operation of a connection takes the current
/// `GameInstant` explicitly, so a simulation (or a test) fully controls the
/// clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GameInstant {
    millis: u32,
}

impl GameInstant {
    pub fn from_millis(millis: u32) -> Self {
        Self { millis }
    }

    pub fn as_millis(&self) -> u32 {
        self.millis
    }

    pub fn add_millis(&self, millis: u32) -> Self {
        Self {
            millis: self.millis.wrapping_add(millis),
        }
    }

    /// Milliseconds from `earlier` to `self`
    pub fn elapsed_since(&self, earlier: &GameInstant) -> u32 {
        self.millis.wrapping_sub(earlier.millis)
    }

    /// True if `self` is at or after `other`, allowing for wrap around
    pub fn has_reached(&self, other: &GameInstant) -> bool {
        (self.millis.wrapping_sub(other.millis) as i32) >= 0
    }
}

/// Converts wall-clock time into `GameInstant`s, counting from construction
pub struct GameClock {
    start: Instant,
}

impl GameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> GameInstant {
        GameInstant::from_millis(self.start.elapsed().as_millis() as u32)
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}
