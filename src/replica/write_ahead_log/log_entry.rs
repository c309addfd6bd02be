use crate::commitlog;
use crate::replica::Term;
use std::convert::TryFrom;
use std::io;

/// Byte representation:
///
/// ```text
/// |                                         1                               |
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 0 | 1 | 2 | 3 | 4 | 5 | 6 | ... |
/// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-...-+
/// |Vrs|Knd|       Term (8 bytes LE)       |   Data (variable size)      ... |
/// +---+---+-------------------------------+-----------------------------...-+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Knd` - entry kind, see [`EntryKind`]
/// * `Term` - raft leadership term when this entry was created
/// * `Data` - app specific data payload for commands, the member list for configuration entries,
///   empty for no-ops
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WriteAheadLogEntry {
    pub term: Term,
    pub kind: EntryKind,
    pub data: Vec<u8>,
}

/// EntryKind distinguishes application commands from entries the engine writes for itself. Only
/// commands reach the state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Command,
    Configuration,
    NoOp,
}

impl EntryKind {
    fn as_byte(self) -> u8 {
        match self {
            EntryKind::Command => 0,
            EntryKind::Configuration => 1,
            EntryKind::NoOp => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(EntryKind::Command),
            1 => Some(EntryKind::Configuration),
            2 => Some(EntryKind::NoOp),
            _ => None,
        }
    }
}

const RAFT_LOG_ENTRY_FORMAT_VERSION: u8 = 2;
const HEADER_LEN: usize = 1 + 1 + 8;

impl commitlog::Entry for WriteAheadLogEntry {}

impl TryFrom<Vec<u8>> for WriteAheadLogEntry {
    type Error = io::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "Log entry is {} bytes, shorter than {} byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if bytes[0] != RAFT_LOG_ENTRY_FORMAT_VERSION {
            return Err(malformed(format!("Unknown log entry format version {}", bytes[0])));
        }
        let kind = EntryKind::from_byte(bytes[1])
            .ok_or_else(|| malformed(format!("Unknown log entry kind {}", bytes[1])))?;

        let mut term_bytes = [0u8; 8];
        term_bytes.copy_from_slice(&bytes[2..HEADER_LEN]);

        Ok(WriteAheadLogEntry {
            term: Term::new(u64::from_le_bytes(term_bytes)),
            kind,
            data: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

impl From<WriteAheadLogEntry> for Vec<u8> {
    fn from(entry: WriteAheadLogEntry) -> Self {
        let mut bytes: Vec<u8> = Vec::with_capacity(HEADER_LEN + entry.data.len());
        bytes.push(RAFT_LOG_ENTRY_FORMAT_VERSION);
        bytes.push(entry.kind.as_byte());
        bytes.extend_from_slice(&entry.term.as_u64().to_le_bytes());
        bytes.extend(entry.data);

        bytes
    }
}

fn malformed(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
