use crate::commitlog::{Entry, Index, Log};
use std::io;
use std::marker::PhantomData;

// Volatile store. Entries are kept in their serialized form so that the conversion logic is
// exercised the same way a disk-backed log would exercise it.
pub(crate) struct InMemoryLog<E: Entry> {
    log: Vec<Vec<u8>>,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub(crate) fn create() -> Self {
        InMemoryLog {
            log: vec![],
            _pd: PhantomData::default(),
        }
    }

    fn vec_index(index: Index) -> usize {
        // Log API states that Index starts from 1.
        (index.as_u64() - 1) as usize
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        self.log.push(entry.into());

        Ok(Index::new_usize(self.log.len()))
    }

    fn get(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.log.get(Self::vec_index(index)) {
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn last_index(&self) -> Option<Index> {
        Index::from_wire(self.log.len() as u64)
    }

    fn truncate_from(&mut self, index: Index) -> Result<(), io::Error> {
        self.log.truncate(Self::vec_index(index));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::convert::TryFrom;

    /// Minimal entry type for exercising the generic log impls.
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct TestEntry(pub(crate) Vec<u8>);

    impl Entry for TestEntry {}

    impl TryFrom<Vec<u8>> for TestEntry {
        type Error = io::Error;

        fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
            if bytes.is_empty() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "empty entry"));
            }
            Ok(TestEntry(bytes))
        }
    }

    impl From<TestEntry> for Vec<u8> {
        fn from(entry: TestEntry) -> Self {
            entry.0
        }
    }

    pub(crate) fn entry(b: u8) -> TestEntry {
        TestEntry(vec![b])
    }

    #[test]
    fn append_then_get() {
        let mut log = InMemoryLog::create();
        assert_eq!(log.last_index(), None);

        assert_eq!(log.append(entry(1)).unwrap(), Index::new(1));
        assert_eq!(log.append(entry(2)).unwrap(), Index::new(2));

        assert_eq!(log.last_index(), Some(Index::new(2)));
        assert_eq!(log.get(Index::new(1)).unwrap(), Some(entry(1)));
        assert_eq!(log.get(Index::new(2)).unwrap(), Some(entry(2)));
        assert_eq!(log.get(Index::new(3)).unwrap(), None);
    }

    #[test]
    fn truncate_discards_suffix_and_reuses_indexes() {
        let mut log = InMemoryLog::create();
        for b in 1..=5 {
            log.append(entry(b)).unwrap();
        }

        log.truncate_from(Index::new(3)).unwrap();
        assert_eq!(log.last_index(), Some(Index::new(2)));
        assert_eq!(log.get(Index::new(3)).unwrap(), None);

        // Indexes stay contiguous after truncation.
        assert_eq!(log.append(entry(9)).unwrap(), Index::new(3));
        assert_eq!(log.get(Index::new(3)).unwrap(), Some(entry(9)));

        log.truncate_from(Index::start_index()).unwrap();
        assert_eq!(log.last_index(), None);
    }

    #[test]
    fn corrupt_entry_surfaces_as_io_error() {
        let mut log: InMemoryLog<TestEntry> = InMemoryLog::create();
        log.log.push(vec![]);

        let err = log.get(Index::new(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
