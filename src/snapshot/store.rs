use crate::commitlog::Index;
use crate::replica::Term;
use bytes::Bytes;
use std::io;

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub last_included_index: Index,
    pub last_included_term: Term,
    pub data: Bytes,
}

pub trait SnapshotStore: Send {
    fn save(&mut self, snapshot: Snapshot) -> Result<(), io::Error>;

    /// Latest saved snapshot, or None if nothing was ever saved.
    fn load(&self) -> Result<Option<Snapshot>, io::Error>;
}

/// NoOpSnapshotStore discards everything and always reports "no snapshot".
pub struct NoOpSnapshotStore;

impl SnapshotStore for NoOpSnapshotStore {
    fn save(&mut self, _: Snapshot) -> Result<(), io::Error> {
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, io::Error> {
        Ok(None)
    }
}

/// InMemorySnapshotStore retains only the newest snapshot.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    latest: Option<Snapshot>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&mut self, snapshot: Snapshot) -> Result<(), io::Error> {
        if let Some(latest) = &self.latest {
            if latest.last_included_index > snapshot.last_included_index {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Snapshot at index {:?} is older than stored snapshot at index {:?}",
                        snapshot.last_included_index, latest.last_included_index
                    ),
                ));
            }
        }

        self.latest.replace(snapshot);
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, io::Error> {
        Ok(self.latest.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(index: u64, data: &'static str) -> Snapshot {
        Snapshot {
            last_included_index: Index::new(index),
            last_included_term: Term::new(1),
            data: Bytes::from(data),
        }
    }

    #[test]
    fn no_op_store_never_has_a_snapshot() {
        let mut store = NoOpSnapshotStore;
        store.save(snapshot(3, "abc")).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn in_memory_store_keeps_newest() {
        let mut store = InMemorySnapshotStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(snapshot(3, "three")).unwrap();
        store.save(snapshot(5, "five")).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot(5, "five")));

        let err = store.save(snapshot(4, "four")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(store.load().unwrap(), Some(snapshot(5, "five")));
    }
}
