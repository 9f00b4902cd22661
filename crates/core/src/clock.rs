use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::CoreError;

fn wall_clock_ms() -> Result<u64, CoreError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| CoreError::InvalidData("system clock reads before 1970".into()))?;
    Ok(since_epoch.as_millis() as u64)
}

/// When a record was written. Ordered by wall time, then by `counter`, which
/// separates stamps issued within one millisecond.
///
/// The 12-byte storage form is big-endian so that byte order and time order agree.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    wall_ms: u64,
    counter: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { wall_ms: 0, counter: 0 };

    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn from_millis(wall_ms: u64) -> Self {
        Self::new(wall_ms, 0)
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; 12] {
        let wall = self.wall_ms.to_be_bytes();
        let counter = self.counter.to_be_bytes();
        std::array::from_fn(|i| if i < 8 { wall[i] } else { counter[i - 8] })
    }

    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        Self {
            wall_ms: u64::from_be_bytes(std::array::from_fn(|i| bytes[i])),
            counter: u32::from_be_bytes(std::array::from_fn(|i| bytes[8 + i])),
        }
    }

    fn successor(&self) -> Self {
        match self.counter.checked_add(1) {
            Some(counter) => Self::new(self.wall_ms, counter),
            None => Self::from_millis(self.wall_ms + 1),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.wall_ms, self.counter)
    }
}

/// Stamps writes. Each stamp sorts after every stamp issued or observed
/// before it, even when the wall clock stalls or steps back.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    last: Timestamp,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: Timestamp::ZERO,
        }
    }

    pub fn tick(&mut self) -> Result<Timestamp, CoreError> {
        let now = Timestamp::from_millis(wall_clock_ms()?);
        self.last = if now > self.last {
            now
        } else {
            self.last.successor()
        };
        Ok(self.last)
    }

    /// Remember a stamp that was issued elsewhere, such as one read back from
    /// the store, so that the next tick lands after it.
    pub fn observe(&mut self, seen: Timestamp) {
        self.last = self.last.max(seen);
    }
}
