//! Player input encoding.
//!
//! A device reports its input as a single integer inside the game
//! document. The encoding is 1-indexed on the wire so that `0` can
//! mean "nothing pressed yet".

/// A decoded player input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    /// 0 — the device has no input to report.
    NoInput,
    /// -1 — the ready signal used by the match handshake.
    Ready,
    /// 1..=7 on the wire, carried here as the 0-indexed column.
    Column(usize),
    /// Anything else. Kept with the raw value for logging.
    Invalid(i32),
}

impl PlayerAction {
    /// Decodes a raw wire integer.
    pub fn decode(raw: i32) -> Self {
        match raw {
            0 => Self::NoInput,
            -1 => Self::Ready,
            1..=7 => Self::Column((raw - 1) as usize),
            other => Self::Invalid(other),
        }
    }

    /// Encodes back to the wire integer.
    pub fn encode(self) -> i32 {
        match self {
            Self::NoInput => 0,
            Self::Ready => -1,
            Self::Column(col) => col as i32 + 1,
            Self::Invalid(raw) => raw,
        }
    }
}
