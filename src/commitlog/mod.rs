mod cache;
mod in_memory;
mod log;

pub(crate) use cache::CachedLog;
pub(crate) use in_memory::InMemoryLog;
pub(crate) use log::Entry;
pub use log::Index;
pub(crate) use log::Log;
