//! Programmed-transfer chunk planning.
//!
//! The host advertises how many bytes it is willing to take per DRQ block through the
//! byte-count limit registers. Each chunk of a programmed (PIO) data phase is sized against
//! that limit, and the chosen size is written back so the host knows exactly how many bytes
//! to read before the next interrupt.

/// Reserved all-ones value of the byte-count limit pair.
pub const BYTE_COUNT_SENTINEL: u16 = 0xFFFF;

/// Normalized byte-count limit.
///
/// Never holds [`BYTE_COUNT_SENTINEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransferLimit(u16);

impl TransferLimit {
    /// Largest valid limit.
    pub const MAX: TransferLimit = TransferLimit(BYTE_COUNT_SENTINEL - 1);

    pub fn from_raw(raw: u16) -> Self {
        if raw == BYTE_COUNT_SENTINEL {
            Self::MAX
        } else {
            Self(raw)
        }
    }

    /// Build the limit from the cylinder low/high register pair.
    pub fn from_registers(lcyl: u8, hcyl: u8) -> Self {
        Self::from_raw(u16::from_le_bytes([lcyl, hcyl]))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Limit applied when a chunk has to be truncated: odd limits drop to the even value below.
    fn truncating(self) -> u16 {
        self.0 & !1
    }
}

/// Result of planning one programmed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Bytes moved by this chunk.
    pub chunk: usize,
    /// Bytes left after this chunk (the new `buflen`).
    pub remaining: usize,
}

impl ChunkPlan {
    /// Value to publish in the byte-count registers for this chunk.
    ///
    /// A planned chunk never exceeds the 16-bit limit it was planned against.
    pub fn byte_count(&self) -> u16 {
        u16::try_from(self.chunk).unwrap_or(u16::MAX)
    }

    pub fn is_final(&self) -> bool {
        self.remaining == 0
    }
}

/// Size the next programmed chunk for `remaining` bytes under `limit`.
pub fn plan_chunk(remaining: usize, limit: TransferLimit) -> ChunkPlan {
    let mut chunk = remaining;
    if chunk > usize::from(limit.get()) {
        chunk = usize::from(limit.truncating());
    }
    ChunkPlan {
        chunk,
        remaining: remaining - chunk,
    }
}
