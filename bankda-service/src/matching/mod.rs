//! Depositor-name matching.
//!
//! Pure and total: every transaction resolves to exactly one outcome, and
//! repeated calls with the same inputs return the same result. Name
//! comparison is exact (case- and whitespace-sensitive) against each
//! member's registered display name; depositors are required to transfer
//! under their registered name, so near-misses stay unmatched. Ambiguity is
//! never broken by amount or any other heuristic.

use crate::models::MemberName;
use uuid::Uuid;

/// Outcome of matching one transaction against a member directory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(Uuid),
    Unmatched,
    DuplicateName,
}

/// Extract the candidate depositor name from the remarks fields.
///
/// `bkjukyo` is the bank's depositor-name field and wins when present;
/// otherwise the first whitespace-delimited token of `bketc` is used.
pub fn depositor_candidate<'a>(bkjukyo: &'a str, bketc: &'a str) -> Option<&'a str> {
    if !bkjukyo.is_empty() {
        return Some(bkjukyo);
    }
    bketc.split_whitespace().next()
}

/// Match a candidate depositor name against the member snapshot.
///
/// Exactly one member with that exact display name matches; zero members is
/// `Unmatched`; two or more is `DuplicateName`, always left for an operator.
pub fn match_depositor(candidate: Option<&str>, members: &[MemberName]) -> MatchOutcome {
    let name = match candidate {
        Some(name) => name,
        None => return MatchOutcome::Unmatched,
    };

    let mut hits = members.iter().filter(|m| m.member_name == name);
    match (hits.next(), hits.next()) {
        (None, _) => MatchOutcome::Unmatched,
        (Some(member), None) => MatchOutcome::Matched(member.member_id),
        (Some(_), Some(_)) => MatchOutcome::DuplicateName,
    }
}

/// Match one transaction's remarks fields against the member snapshot.
pub fn match_transaction(bkjukyo: &str, bketc: &str, members: &[MemberName]) -> MatchOutcome {
    match_depositor(depositor_candidate(bkjukyo, bketc), members)
}
