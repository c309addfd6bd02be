//! This module is a raft-specific commit log that wraps the generic commit log. It also owns the
//! application state machine, since applying committed entries is the last step of the log.

mod log;
mod log_entry;

pub(crate) use log::WriteAheadLog;
pub(crate) use log_entry::EntryKind;
pub(crate) use log_entry::WriteAheadLogEntry;
