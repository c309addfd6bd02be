//! Conversions between replica types and their protobuf form. Shared by the gRPC client and
//! server so both ends agree on the "0 means no entry" encoding.

use crate::commitlog::Index;
use crate::grpc::{
    ProtoAppendEntriesReq, ProtoAppendEntriesResult, ProtoEntryKind, ProtoLogEntry, ProtoRequestVoteReq,
    ProtoRequestVoteResult,
};
use crate::replica::{
    AppendEntriesInput, AppendEntriesLogEntry, AppendEntriesOutput, EntryKind, ReplicaId, RequestVoteInput,
    RequestVoteOutput, Term,
};
use bytes::Bytes;

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub(crate) struct MalformedMessage(pub(crate) String);

fn log_entry_metadata_to_wire(metadata: Option<(Term, Index)>) -> (u64, u64) {
    match metadata {
        None => (0, 0),
        Some((term, index)) => (term.as_u64(), index.as_u64()),
    }
}

fn log_entry_metadata_from_wire(term: u64, index: u64) -> Result<Option<(Term, Index)>, MalformedMessage> {
    match (term, index) {
        (0, 0) => Ok(None),
        (0, _) => Err(MalformedMessage("Log entry term 0 with non-0 index".into())),
        (_, 0) => Err(MalformedMessage("Log entry index 0 with non-0 term".into())),
        (term, index) => Ok(Some((Term::new(term), Index::new(index)))),
    }
}

fn index_to_wire(index: Option<Index>) -> u64 {
    index.map(|i| i.as_u64()).unwrap_or(0)
}

fn entry_kind_to_wire(kind: EntryKind) -> ProtoEntryKind {
    match kind {
        EntryKind::Command => ProtoEntryKind::Command,
        EntryKind::Configuration => ProtoEntryKind::Configuration,
        EntryKind::NoOp => ProtoEntryKind::NoOp,
    }
}

fn entry_kind_from_wire(kind: i32) -> Result<EntryKind, MalformedMessage> {
    match ProtoEntryKind::from_i32(kind) {
        Some(ProtoEntryKind::Command) => Ok(EntryKind::Command),
        Some(ProtoEntryKind::Configuration) => Ok(EntryKind::Configuration),
        Some(ProtoEntryKind::NoOp) => Ok(EntryKind::NoOp),
        None => Err(MalformedMessage(format!("Unknown entry kind {}", kind))),
    }
}

fn replica_id_from_wire(id: String) -> Result<ReplicaId, MalformedMessage> {
    if id.is_empty() {
        return Err(MalformedMessage("Empty replica ID".into()));
    }
    Ok(ReplicaId::new(id))
}

pub(crate) fn request_vote_to_proto(input: RequestVoteInput) -> ProtoRequestVoteReq {
    let (last_log_term, last_log_index) = log_entry_metadata_to_wire(input.candidate_last_log_entry);
    ProtoRequestVoteReq {
        term: input.candidate_term.as_u64(),
        candidate_id: input.candidate_id.into_inner(),
        last_log_index,
        last_log_term,
    }
}

pub(crate) fn request_vote_from_proto(req: ProtoRequestVoteReq) -> Result<RequestVoteInput, MalformedMessage> {
    Ok(RequestVoteInput {
        candidate_term: Term::new(req.term),
        candidate_id: replica_id_from_wire(req.candidate_id)?,
        candidate_last_log_entry: log_entry_metadata_from_wire(req.last_log_term, req.last_log_index)?,
    })
}

pub(crate) fn request_vote_output_to_proto(output: RequestVoteOutput) -> ProtoRequestVoteResult {
    ProtoRequestVoteResult {
        term: output.term.as_u64(),
        vote_granted: output.vote_granted,
    }
}

pub(crate) fn request_vote_output_from_proto(result: ProtoRequestVoteResult) -> RequestVoteOutput {
    RequestVoteOutput {
        term: Term::new(result.term),
        vote_granted: result.vote_granted,
    }
}

pub(crate) fn append_entries_to_proto(input: AppendEntriesInput) -> ProtoAppendEntriesReq {
    let (prev_log_term, prev_log_index) = log_entry_metadata_to_wire(input.leader_previous_log_entry);
    ProtoAppendEntriesReq {
        term: input.leader_term.as_u64(),
        leader_id: input.leader_id.into_inner(),
        prev_log_index,
        prev_log_term,
        entries: input
            .new_entries
            .into_iter()
            .map(|entry| ProtoLogEntry {
                term: entry.term.as_u64(),
                kind: entry_kind_to_wire(entry.kind) as i32,
                data: entry.data.to_vec(),
            })
            .collect(),
        leader_commit: index_to_wire(input.leader_commit_index),
    }
}

pub(crate) fn append_entries_from_proto(req: ProtoAppendEntriesReq) -> Result<AppendEntriesInput, MalformedMessage> {
    let leader_previous_log_entry = log_entry_metadata_from_wire(req.prev_log_term, req.prev_log_index)?;

    let mut new_entries = Vec::with_capacity(req.entries.len());
    for entry in req.entries {
        if entry.term == 0 {
            return Err(MalformedMessage("Log entry with term 0".into()));
        }
        new_entries.push(AppendEntriesLogEntry {
            term: Term::new(entry.term),
            kind: entry_kind_from_wire(entry.kind)?,
            data: Bytes::from(entry.data),
        });
    }

    Ok(AppendEntriesInput {
        leader_term: Term::new(req.term),
        leader_id: replica_id_from_wire(req.leader_id)?,
        leader_previous_log_entry,
        leader_commit_index: Index::from_wire(req.leader_commit),
        new_entries,
    })
}

pub(crate) fn append_entries_output_to_proto(output: AppendEntriesOutput) -> ProtoAppendEntriesResult {
    ProtoAppendEntriesResult {
        term: output.term.as_u64(),
        success: output.success,
        last_log_index: index_to_wire(output.last_log_index),
    }
}

pub(crate) fn append_entries_output_from_proto(result: ProtoAppendEntriesResult) -> AppendEntriesOutput {
    AppendEntriesOutput {
        term: Term::new(result.term),
        success: result.success,
        last_log_index: Index::from_wire(result.last_log_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_entries_input() -> AppendEntriesInput {
        AppendEntriesInput {
            leader_term: Term::new(3),
            leader_id: ReplicaId::new("leader"),
            leader_previous_log_entry: Some((Term::new(2), Index::new(7))),
            leader_commit_index: Some(Index::new(6)),
            new_entries: vec![
                AppendEntriesLogEntry {
                    term: Term::new(3),
                    kind: EntryKind::NoOp,
                    data: Bytes::new(),
                },
                AppendEntriesLogEntry {
                    term: Term::new(3),
                    kind: EntryKind::Command,
                    data: Bytes::from("set x=1"),
                },
            ],
        }
    }

    #[test]
    fn no_entry_is_encoded_as_zeros() {
        let req = request_vote_to_proto(RequestVoteInput {
            candidate_term: Term::new(1),
            candidate_id: ReplicaId::new("c"),
            candidate_last_log_entry: None,
        });
        assert_eq!((req.last_log_term, req.last_log_index), (0, 0));

        let result = append_entries_output_to_proto(AppendEntriesOutput {
            term: Term::new(1),
            success: false,
            last_log_index: None,
        });
        assert_eq!(result.last_log_index, 0);
    }

    #[test]
    fn append_entries_survives_the_wire() {
        let proto = append_entries_to_proto(append_entries_input());
        assert_eq!(proto.entries[0].kind, ProtoEntryKind::NoOp as i32);
        assert_eq!(append_entries_from_proto(proto), Ok(append_entries_input()));
    }

    #[test]
    fn half_set_log_entry_metadata_is_rejected() {
        let mut proto = append_entries_to_proto(append_entries_input());
        proto.prev_log_term = 0;
        assert!(append_entries_from_proto(proto).is_err());

        let req = ProtoRequestVoteReq {
            term: 2,
            candidate_id: "c".into(),
            last_log_index: 0,
            last_log_term: 5,
        };
        assert!(request_vote_from_proto(req).is_err());
    }

    #[test]
    fn unknown_entry_kind_and_empty_ids_are_rejected() {
        let mut proto = append_entries_to_proto(append_entries_input());
        proto.entries[1].kind = 17;
        assert_eq!(
            append_entries_from_proto(proto),
            Err(MalformedMessage("Unknown entry kind 17".into()))
        );

        let mut proto = append_entries_to_proto(append_entries_input());
        proto.leader_id = String::new();
        assert!(append_entries_from_proto(proto).is_err());
    }
}
