//! Transaction status word
//!
//! Every call to the native begin primitive produces a 32-bit status word:
//!
//! ```text
//!  31        24 23                6 5      0
//! +------------+-------------------+--------+
//! |   reason   |     reserved      | flags  |
//! +------------+-------------------+--------+
//! ```
//!
//! The all-ones word means the transaction started. Any other value is an
//! abort status: a set of [`AbortFlags`] in the low bits plus, when
//! [`AbortFlags::EXPLICIT`] is set, the 8-bit reason passed to abort.
//!
//! ## Encoding ambiguity
//!
//! The started word is numerically identical to "every abort flag set".
//! The native primitive never produces the latter, so the all-ones word is
//! treated strictly as started and no further validation is attempted.
//! Flag tests on the raw word therefore report every flag as present on a
//! started word; [`StatusWord::flags`] masks that away, [`StatusWord::is_flagged`]
//! deliberately does not.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of abort cause bits carried in the low byte of a status word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AbortFlags(u32);

impl AbortFlags {
    /// Abort was requested explicitly; the reason byte is valid
    pub const EXPLICIT: AbortFlags = AbortFlags(1 << 0);
    /// The hardware hints that the transaction may succeed on retry
    pub const RETRY: AbortFlags = AbortFlags(1 << 1);
    /// Another logical processor conflicted with a memory address in the transaction
    pub const CONFLICT: AbortFlags = AbortFlags(1 << 2);
    /// An internal buffer overflowed (read or write set too large)
    pub const CAPACITY: AbortFlags = AbortFlags(1 << 3);
    /// A debug breakpoint was hit
    pub const DEBUG: AbortFlags = AbortFlags(1 << 4);
    /// The abort happened inside a nested transaction
    pub const NESTED: AbortFlags = AbortFlags(1 << 5);
    /// Every defined flag
    pub const ALL: AbortFlags = AbortFlags(0x3F);

    const NAMES: [(AbortFlags, &'static str); 6] = [
        (Self::EXPLICIT, "EXPLICIT"),
        (Self::RETRY, "RETRY"),
        (Self::CONFLICT, "CONFLICT"),
        (Self::CAPACITY, "CAPACITY"),
        (Self::DEBUG, "DEBUG"),
        (Self::NESTED, "NESTED"),
    ];

    /// No flags
    pub const fn empty() -> Self {
        AbortFlags(0)
    }

    /// Build from raw bits, dropping anything outside [`AbortFlags::ALL`]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        AbortFlags(bits & Self::ALL.0)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is also set in `self`
    pub const fn contains(self, other: AbortFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets
    pub const fn union(self, other: AbortFlags) -> Self {
        AbortFlags(self.0 | other.0)
    }
}

impl BitOr for AbortFlags {
    type Output = AbortFlags;

    fn bitor(self, rhs: AbortFlags) -> AbortFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for AbortFlags {
    fn bitor_assign(&mut self, rhs: AbortFlags) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for AbortFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AbortFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbortFlags({})", self)
    }
}

/// Decoded outcome of one begin
///
/// A plain value: produced fresh by each begin, immutable, never persisted.
/// Decoding is total and allocation free, so it is safe to call right after
/// an abort while the thread is still on the transactional fast path.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u32);

impl StatusWord {
    /// Raw value returned by begin when the transaction started
    pub const STARTED_RAW: u32 = 0xFFFF_FFFF;

    /// The started status
    pub const STARTED: StatusWord = StatusWord(Self::STARTED_RAW);

    const REASON_SHIFT: u32 = 24;

    /// Decode a raw status word
    #[inline]
    pub const fn decode(raw: u32) -> Self {
        StatusWord(raw)
    }

    /// Encode an explicit abort carrying `reason`
    #[inline]
    pub const fn explicit(reason: u8) -> Self {
        StatusWord(AbortFlags::EXPLICIT.0 | ((reason as u32) << Self::REASON_SHIFT))
    }

    /// Encode an abort with the given flags and a zero reason byte
    #[inline]
    pub const fn aborted(flags: AbortFlags) -> Self {
        StatusWord(flags.0)
    }

    /// Add flags to an abort status
    ///
    /// Has no effect on the started word, which already has every bit set.
    #[inline]
    pub const fn with_flags(self, flags: AbortFlags) -> Self {
        StatusWord(self.0 | flags.0)
    }

    /// The raw 32-bit value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True iff all 32 bits are set
    #[inline]
    pub const fn is_started(self) -> bool {
        self.0 == Self::STARTED_RAW
    }

    /// Abort flags, empty for the started word
    #[inline]
    pub const fn flags(self) -> AbortFlags {
        if self.is_started() {
            AbortFlags::empty()
        } else {
            AbortFlags::from_bits_truncate(self.0)
        }
    }

    /// Exact-mask test: true when every bit of `flag` is set in the raw word
    ///
    /// `flag` may combine several bits. The test runs against the raw word,
    /// so it is true for any flag on the started word; check
    /// [`is_started`](Self::is_started) first.
    #[inline]
    pub const fn is_flagged(self, flag: AbortFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Bits 24..=31 of the raw word
    ///
    /// Only meaningful when [`AbortFlags::EXPLICIT`] is set; returned
    /// unconditionally otherwise.
    #[inline]
    pub const fn abort_reason(self) -> u8 {
        (self.0 >> Self::REASON_SHIFT) as u8
    }

    /// The reason byte of an explicit abort, `None` for any other status
    #[inline]
    pub const fn explicit_reason(self) -> Option<u8> {
        if self.is_explicit() {
            Some(self.abort_reason())
        } else {
            None
        }
    }

    /// Aborted by an explicit abort request
    #[inline]
    pub const fn is_explicit(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::EXPLICIT)
    }

    /// Aborted, and the hardware hints a retry may succeed
    #[inline]
    pub const fn may_retry(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::RETRY)
    }

    /// Aborted by a memory conflict
    #[inline]
    pub const fn is_conflict(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::CONFLICT)
    }

    /// Aborted by a capacity overflow
    #[inline]
    pub const fn is_capacity(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::CAPACITY)
    }

    /// Aborted by a debug trap
    #[inline]
    pub const fn is_debug(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::DEBUG)
    }

    /// Aborted inside a nested transaction
    #[inline]
    pub const fn is_nested(self) -> bool {
        !self.is_started() && self.is_flagged(AbortFlags::NESTED)
    }
}

impl From<u32> for StatusWord {
    fn from(raw: u32) -> Self {
        StatusWord::decode(raw)
    }
}

impl From<StatusWord> for u32 {
    fn from(status: StatusWord) -> Self {
        status.raw()
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_started() {
            return f.write_str("StatusWord(STARTED)");
        }
        match self.explicit_reason() {
            Some(reason) => write!(
                f,
                "StatusWord({:#010x}, {}, reason={})",
                self.0,
                self.flags(),
                reason
            ),
            None => write!(f, "StatusWord({:#010x}, {})", self.0, self.flags()),
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_started() {
            return f.write_str("started");
        }
        match self.explicit_reason() {
            Some(reason) => write!(f, "aborted [{}] reason {}", self.flags(), reason),
            None => write!(f, "aborted [{}]", self.flags()),
        }
    }
}
