use crate::actor::Callback;
use crate::commitlog;
use crate::commitlog::Index;
use crate::replica::local_state::Term;
use crate::replica::replica_api::{
    EnqueueForReplicationError, EnqueueForReplicationOutput, TakeSnapshotError, TakeSnapshotOutput,
};
use crate::replica::state_machine::{StateMachine, StateMachineOutput};
use crate::replica::write_ahead_log::{EntryKind, WriteAheadLogEntry};
use crate::snapshot::{Snapshot, SnapshotStore};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;

pub(crate) type EnqueueCallback = Callback<Result<EnqueueForReplicationOutput, EnqueueForReplicationError>>;

/// WriteAheadLog is the raft-specific log facade.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to majority
/// 2. Committed - written to disk, replicated to majority
/// 3. Applied - a committed entry that has also been applied to the state machine
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
pub(crate) struct WriteAheadLog<L>
where
    L: commitlog::Log<WriteAheadLogEntry>,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    // Metadata about the highest log entry that we've locally written. It must be updated atomically.
    latest_entry_metadata: Option<(Term, Index)>,

    // Index of highest log entry known to be committed. None if nothing is committed.
    commit_index: Option<Index>,
    // Highest log entry applied to state machine. None if nothing is applied.
    last_applied: Option<(Term, Index)>,

    state_machine: Box<dyn StateMachine>,
    snapshot_store: Box<dyn SnapshotStore>,

    // Leader only. Writers waiting for their entry to be applied, keyed by the entry's index. The
    // term is the one the entry was appended in; if a different entry ends up applied at that
    // index, the write was lost.
    pending_writes: BTreeMap<Index, (Term, EnqueueCallback)>,
}

impl<L> WriteAheadLog<L>
where
    L: commitlog::Log<WriteAheadLogEntry>,
{
    pub(crate) fn new(
        logger: slog::Logger,
        log: L,
        state_machine: Box<dyn StateMachine>,
        snapshot_store: Box<dyn SnapshotStore>,
    ) -> Result<Self, io::Error> {
        let mut latest_entry_metadata = None;
        if let Some(last_index) = log.last_index() {
            let entry = log.get(last_index)?.ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("Log is missing last index {:?}", last_index))
            })?;
            latest_entry_metadata = Some((entry.term, last_index));
        }

        let mut wal = WriteAheadLog {
            logger,
            log,
            latest_entry_metadata,
            commit_index: None,
            last_applied: None,
            state_machine,
            snapshot_store,
            pending_writes: BTreeMap::new(),
        };
        wal.restore_from_snapshot()?;

        Ok(wal)
    }

    fn restore_from_snapshot(&mut self) -> Result<(), io::Error> {
        let snapshot = match self.snapshot_store.load()? {
            Some(snapshot) => snapshot,
            None => {
                slog::info!(self.logger, "No snapshot found. State machine starts empty.");
                return Ok(());
            }
        };

        // An empty log (e.g. storage was wiped) starts after the snapshot. Replication fills the
        // log in from the leader, and nothing at or below the snapshot is applied again. A
        // non-empty log must still hold the snapshot's last entry.
        if !self.is_empty() {
            let covered = matches!(
                self.read(snapshot.last_included_index)?,
                Some(entry) if entry.term == snapshot.last_included_term
            );
            if !covered {
                slog::warn!(
                    self.logger,
                    "Ignoring snapshot at {:?}/{:?}; local log does not contain it.",
                    snapshot.last_included_term,
                    snapshot.last_included_index
                );
                return Ok(());
            }
        }

        slog::info!(
            self.logger,
            "Restoring state machine from snapshot at {:?}/{:?}",
            snapshot.last_included_term,
            snapshot.last_included_index
        );
        self.state_machine.restore(snapshot.data);
        self.commit_index = Some(snapshot.last_included_index);
        self.last_applied = Some((snapshot.last_included_term, snapshot.last_included_index));

        Ok(())
    }

    pub(crate) fn latest_entry(&self) -> Option<(Term, Index)> {
        self.latest_entry_metadata
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.latest_entry_metadata.is_none()
    }

    pub(crate) fn read(&self, index: Index) -> Result<Option<WriteAheadLogEntry>, io::Error> {
        self.log.get(index)
    }

    fn read_required(&self, index: Index) -> Result<WriteAheadLogEntry, io::Error> {
        match self.read(index) {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => panic!("read_required() found no log entry for index {:?}", index),
            Err(ioe) => Err(ioe),
        }
    }

    /// Remove anything starting at `index` and later. Writers waiting on removed entries are
    /// told their write was lost.
    pub(crate) fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        if let Some(commit_index) = self.commit_index {
            assert!(
                index > commit_index,
                "Can't truncate committed entries. Expected [truncate from] {:?} > {:?} [commit index]",
                index,
                commit_index
            );
        }

        let mut new_latest_entry_metadata = None;
        if let Some(new_latest_entry_index) = index.checked_minus(1) {
            new_latest_entry_metadata = self
                .read(new_latest_entry_index)?
                .map(|latest_entry| (latest_entry.term, new_latest_entry_index));
        }

        // Only update state after we've successfully read what new state will be.
        self.log.truncate_from(index)?;
        self.latest_entry_metadata = new_latest_entry_metadata;

        let lost = self.pending_writes.split_off(&index);
        for (_, (_, callback)) in lost {
            callback.send(Err(EnqueueForReplicationError::LeadershipLost));
        }

        Ok(())
    }

    pub(crate) fn append(&mut self, entry: WriteAheadLogEntry) -> Result<Index, io::Error> {
        let expected_index = self
            .latest_entry_metadata
            .map(|(_, index)| index.plus(1))
            .unwrap_or_else(Index::start_index);

        let appended_term = entry.term;
        let appended_index = self.log.append(entry)?;
        assert_eq!(
            appended_index, expected_index,
            "Log appended at an unexpected index"
        );

        // Only update state after log action completes.
        self.latest_entry_metadata = Some((appended_term, appended_index));

        Ok(appended_index)
    }

    /// Leader only. `callback` resolves once the entry at `index` is applied.
    pub(crate) fn register_pending_write(&mut self, index: Index, term: Term, callback: EnqueueCallback) {
        self.pending_writes.insert(index, (term, callback));
    }

    /// Called on leadership loss. The entries themselves stay in the log and may still commit.
    pub(crate) fn fail_all_pending_writes(&mut self) {
        let pending_writes = std::mem::take(&mut self.pending_writes);
        if !pending_writes.is_empty() {
            slog::info!(self.logger, "Failing {} pending writes", pending_writes.len());
        }
        for (_, (_, callback)) in pending_writes {
            callback.send(Err(EnqueueForReplicationError::LeadershipLost));
        }
    }

    pub(crate) fn commit_index(&self) -> Option<Index> {
        self.commit_index
    }

    /// Leader path. Only entries from the leader's current term are committed by counting
    /// replicas; earlier entries commit implicitly with them.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: Index,
        current_term: Term,
    ) -> Result<(), io::Error> {
        // The quorum index of a fresh leader can trail the commit index it learned as follower.
        if matches!(self.commit_index, Some(ci) if tentative_new_commit_index <= ci) {
            return Ok(());
        }

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        let entry = self.read_required(tentative_new_commit_index)?;
        if entry.term != current_term {
            return Ok(());
        }

        self.ratchet_fwd_commit_index_panicking(tentative_new_commit_index);

        Ok(())
    }

    /// Follower path. A leader commit index at or below ours is ignored.
    pub(crate) fn ratchet_fwd_commit_index_if_changed(&mut self, new_commit_index: Index) {
        if matches!(self.commit_index, Some(ci) if new_commit_index <= ci) {
            return;
        }

        self.ratchet_fwd_commit_index_panicking(new_commit_index);
    }

    fn ratchet_fwd_commit_index_panicking(&mut self, new_commit_index: Index) {
        // Assert we only ratchet commit index forward.
        if let Some(current_commit_index) = self.commit_index {
            assert!(
                new_commit_index > current_commit_index,
                "Can't ratchet commit index backwards. Expected [input] {:?} > {:?} [current]",
                new_commit_index,
                current_commit_index,
            );
        }

        // Assert we only mark as committed if we have the entry locally.
        let latest_locally_written_index = self
            .latest_entry_metadata
            .map(|(_, index)| index)
            .expect("Can't ratchet commit index forward if we don't have any local logs");
        assert!(
            latest_locally_written_index >= new_commit_index,
            "Can't ratchet commit index forwards past our local log. Expected [latest log] {:?} >= {:?} [input]",
            latest_locally_written_index,
            new_commit_index,
        );

        self.commit_index.replace(new_commit_index);
    }

    /// apply_all_committed_entries applies all committed but unapplied entries in order.
    pub(crate) fn apply_all_committed_entries(&mut self) {
        if let Err(e) = self.try_apply_all_committed_entries() {
            // The log is already durable. We retry the next time the commit index moves.
            slog::error!(self.logger, "Failed to apply a log entry. {:?}", e);
        }
    }

    fn try_apply_all_committed_entries(&mut self) -> Result<(), io::Error> {
        let commit_index = match self.commit_index {
            Some(ci) => ci,
            None => return Ok(()),
        };

        let mut next_index = self
            .last_applied
            .map(|(_, index)| index.plus(1))
            .unwrap_or_else(Index::start_index);

        // This may be a long running loop, and starve the Replica event loop. It's only long for a
        // follower catching up, which is off the critical path.
        while next_index <= commit_index {
            self.apply_single_entry(next_index)?;
            next_index = next_index.plus(1);
        }

        Ok(())
    }

    fn apply_single_entry(&mut self, index_to_apply: Index) -> Result<(), io::Error> {
        let entry = self.read_required(index_to_apply)?;
        let entry_term = entry.term;

        let output = match entry.kind {
            EntryKind::Command => self.state_machine.apply(Bytes::from(entry.data)),
            EntryKind::Configuration | EntryKind::NoOp => StateMachineOutput::NoData,
        };
        self.last_applied.replace((entry_term, index_to_apply));

        if let Some((pending_term, callback)) = self.pending_writes.remove(&index_to_apply) {
            if pending_term == entry_term {
                callback.send(Ok(EnqueueForReplicationOutput {
                    enqueued_term: entry_term,
                    enqueued_index: index_to_apply,
                    state_machine_output: output,
                }));
            } else {
                callback.send(Err(EnqueueForReplicationError::LeadershipLost));
            }
        }

        Ok(())
    }

    pub(crate) fn take_snapshot(&mut self) -> Result<TakeSnapshotOutput, TakeSnapshotError> {
        let (last_included_term, last_included_index) = self.last_applied.ok_or(TakeSnapshotError::NothingApplied)?;

        self.snapshot_store
            .save(Snapshot {
                last_included_index,
                last_included_term,
                data: self.state_machine.snapshot(),
            })
            .map_err(TakeSnapshotError::LocalIoError)?;

        slog::info!(
            self.logger,
            "Saved snapshot at {:?}/{:?}",
            last_included_term,
            last_included_index
        );

        Ok(TakeSnapshotOutput {
            last_included_term,
            last_included_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::{InMemoryLog, Log};
    use crate::snapshot::InMemorySnapshotStore;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    /// Records every applied command and echoes it back.
    struct EchoStateMachine {
        applied: Arc<Mutex<Vec<Bytes>>>,
    }

    impl StateMachine for EchoStateMachine {
        fn apply(&mut self, command: Bytes) -> StateMachineOutput {
            self.applied.lock().unwrap().push(command.clone());
            StateMachineOutput::Data(command)
        }

        fn snapshot(&self) -> Bytes {
            Bytes::from(format!("{}", self.applied.lock().unwrap().len()))
        }

        fn restore(&mut self, snapshot: Bytes) {
            self.applied.lock().unwrap().push(snapshot);
        }
    }

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn create_wal() -> (WriteAheadLog<InMemoryLog<WriteAheadLogEntry>>, Arc<Mutex<Vec<Bytes>>>) {
        create_wal_with(InMemoryLog::create(), InMemorySnapshotStore::new())
    }

    fn create_wal_with(
        log: InMemoryLog<WriteAheadLogEntry>,
        snapshot_store: InMemorySnapshotStore,
    ) -> (WriteAheadLog<InMemoryLog<WriteAheadLogEntry>>, Arc<Mutex<Vec<Bytes>>>) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let state_machine = EchoStateMachine {
            applied: applied.clone(),
        };
        let wal = WriteAheadLog::new(logger(), log, Box::new(state_machine), Box::new(snapshot_store)).unwrap();
        (wal, applied)
    }

    fn stored_snapshot(term: u64, index: u64, data: &'static str) -> InMemorySnapshotStore {
        let mut store = InMemorySnapshotStore::new();
        store
            .save(Snapshot {
                last_included_index: Index::new(index),
                last_included_term: Term::new(term),
                data: Bytes::from(data),
            })
            .unwrap();
        store
    }

    fn command(term: u64, data: &'static str) -> WriteAheadLogEntry {
        WriteAheadLogEntry {
            term: Term::new(term),
            kind: EntryKind::Command,
            data: data.as_bytes().to_vec(),
        }
    }

    fn noop(term: u64) -> WriteAheadLogEntry {
        WriteAheadLogEntry {
            term: Term::new(term),
            kind: EntryKind::NoOp,
            data: vec![],
        }
    }

    fn pending() -> (
        EnqueueCallback,
        oneshot::Receiver<Result<EnqueueForReplicationOutput, EnqueueForReplicationError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (Callback(tx), rx)
    }

    #[test]
    fn only_commands_reach_the_state_machine() {
        let (mut wal, applied) = create_wal();
        wal.append(noop(1)).unwrap();
        wal.append(command(1, "a")).unwrap();
        wal.append(command(1, "b")).unwrap();

        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));
        wal.apply_all_committed_entries();
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("a")]);

        wal.ratchet_fwd_commit_index_if_changed(Index::new(3));
        wal.apply_all_committed_entries();
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn leader_commits_only_current_term_entries_by_counting() {
        let (mut wal, _) = create_wal();
        wal.append(command(1, "old")).unwrap();
        wal.append(noop(2)).unwrap();

        wal.ratchet_fwd_commit_index_if_valid(Index::new(1), Term::new(2)).unwrap();
        assert_eq!(wal.commit_index(), None);

        wal.ratchet_fwd_commit_index_if_valid(Index::new(2), Term::new(2)).unwrap();
        assert_eq!(wal.commit_index(), Some(Index::new(2)));

        // Stale quorum index is ignored.
        wal.ratchet_fwd_commit_index_if_valid(Index::new(1), Term::new(2)).unwrap();
        assert_eq!(wal.commit_index(), Some(Index::new(2)));
    }

    #[tokio::test]
    async fn pending_write_resolves_with_state_machine_output() {
        let (mut wal, _) = create_wal();
        let index = wal.append(command(3, "hello")).unwrap();
        let (callback, rx) = pending();
        wal.register_pending_write(index, Term::new(3), callback);

        wal.ratchet_fwd_commit_index_if_valid(index, Term::new(3)).unwrap();
        wal.apply_all_committed_entries();

        let output = rx.await.unwrap().unwrap();
        assert_eq!(output.enqueued_term, Term::new(3));
        assert_eq!(output.enqueued_index, index);
        assert_eq!(output.state_machine_output, StateMachineOutput::Data(Bytes::from("hello")));
    }

    #[tokio::test]
    async fn truncation_fails_pending_writes_in_removed_suffix() {
        let (mut wal, _) = create_wal();
        wal.append(command(1, "a")).unwrap();
        let kept_index = wal.append(command(1, "b")).unwrap();
        let lost_index = wal.append(command(1, "c")).unwrap();

        let (kept_callback, mut kept_rx) = pending();
        let (lost_callback, lost_rx) = pending();
        wal.register_pending_write(kept_index, Term::new(1), kept_callback);
        wal.register_pending_write(lost_index, Term::new(1), lost_callback);

        wal.truncate(lost_index).unwrap();
        assert_eq!(wal.latest_entry(), Some((Term::new(1), kept_index)));
        assert!(matches!(
            lost_rx.await.unwrap(),
            Err(EnqueueForReplicationError::LeadershipLost)
        ));
        assert!(kept_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overwritten_entry_fails_its_writer() {
        let (mut wal, _) = create_wal();
        let index = wal.append(command(1, "mine")).unwrap();
        let (callback, rx) = pending();
        wal.register_pending_write(index, Term::new(1), callback);

        // A later leader's entry lands at the same index without going through truncate().
        wal.log.truncate_from(index).unwrap();
        wal.latest_entry_metadata = None;
        wal.append(command(2, "theirs")).unwrap();

        wal.ratchet_fwd_commit_index_if_changed(index);
        wal.apply_all_committed_entries();
        assert!(matches!(rx.await.unwrap(), Err(EnqueueForReplicationError::LeadershipLost)));
    }

    #[test]
    #[should_panic(expected = "Can't truncate committed entries")]
    fn truncating_committed_entry_panics() {
        let (mut wal, _) = create_wal();
        wal.append(command(1, "a")).unwrap();
        wal.ratchet_fwd_commit_index_if_changed(Index::new(1));
        let _ = wal.truncate(Index::new(1));
    }

    #[test]
    fn snapshot_requires_applied_entries() {
        let (mut wal, _) = create_wal();
        assert!(matches!(wal.take_snapshot(), Err(TakeSnapshotError::NothingApplied)));

        wal.append(command(4, "a")).unwrap();
        wal.ratchet_fwd_commit_index_if_changed(Index::new(1));
        wal.apply_all_committed_entries();

        let output = wal.take_snapshot().unwrap();
        assert_eq!(output.last_included_term, Term::new(4));
        assert_eq!(output.last_included_index, Index::new(1));
        assert_eq!(
            wal.snapshot_store.load().unwrap().map(|s| s.data),
            Some(Bytes::from("1"))
        );
    }

    #[test]
    fn snapshot_restores_into_empty_log_and_replication_resumes_after_it() {
        let (mut wal, applied) = create_wal_with(InMemoryLog::create(), stored_snapshot(2, 3, "state@3"));
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("state@3")]);
        assert_eq!(wal.commit_index(), Some(Index::new(3)));
        assert!(wal.is_empty());

        // The leader replicates from the start of the log; covered entries aren't applied again.
        wal.append(command(1, "a")).unwrap();
        wal.append(command(2, "b")).unwrap();
        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));
        wal.apply_all_committed_entries();
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("state@3")]);

        wal.append(command(2, "c")).unwrap();
        wal.append(command(2, "d")).unwrap();
        wal.ratchet_fwd_commit_index_if_changed(Index::new(4));
        wal.apply_all_committed_entries();
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("state@3"), Bytes::from("d")]);

        let output = wal.take_snapshot().unwrap();
        assert_eq!(output.last_included_index, Index::new(4));
    }

    #[test]
    fn snapshot_not_in_non_empty_log_is_ignored() {
        let mut log = InMemoryLog::create();
        log.append(command(1, "a")).unwrap();
        let (wal, applied) = create_wal_with(log, stored_snapshot(2, 1, "other"));
        assert!(applied.lock().unwrap().is_empty());
        assert_eq!(wal.commit_index(), None);
    }

    #[test]
    fn snapshot_covered_by_log_restores_and_skips_covered_entries() {
        let mut log = InMemoryLog::create();
        log.append(command(1, "a")).unwrap();
        log.append(command(1, "b")).unwrap();
        let (mut wal, applied) = create_wal_with(log, stored_snapshot(1, 1, "state@1"));
        assert_eq!(wal.commit_index(), Some(Index::new(1)));

        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));
        wal.apply_all_committed_entries();
        assert_eq!(*applied.lock().unwrap(), vec![Bytes::from("state@1"), Bytes::from("b")]);
    }
}
