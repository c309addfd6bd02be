use std::convert::TryFrom;
use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Index is an index of an entry in the log; i.e. a log entry's index. Indexes start at 1, so
/// "no entry" is modeled as `Option<Index>` rather than index 0.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Index(U64NonZero);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(U64NonZero::new(index))
    }

    pub(crate) fn new_usize(index: usize) -> Self {
        Self::new(index as u64)
    }

    /// Converts a wire value where 0 means "no entry".
    pub(crate) fn from_wire(index: u64) -> Option<Self> {
        match index {
            0 => None,
            i => Some(Index::new(i)),
        }
    }

    pub(crate) fn start_index() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub(crate) fn plus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() + delta)
    }

    pub(crate) fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.as_u64().checked_sub(delta).and_then(Index::from_wire)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// Log is an append only log intended for use as a replicated commit log.
///
/// Log indexes entries starting from 1, contiguously. There will be no entry existing at index 0.
/// The first entry is written at index 1.
pub(crate) trait Log<E: Entry>: Send {
    /// append() appends a log entry to the log at the next log entry index, then returns
    /// the log entry index that was just used to append the entry.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read log entry at specified index.
    fn get(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Index of the latest entry, or None if the log is empty.
    fn last_index(&self) -> Option<Index>;

    /// Removes the entry at `index` and everything after it.
    fn truncate_from(&mut self, index: Index) -> Result<(), io::Error>;
}

/// Entries are stored in their serialized form, so decoding is fallible.
pub(crate) trait Entry: Clone + Send + TryFrom<Vec<u8>, Error = io::Error> + Into<Vec<u8>> {}
