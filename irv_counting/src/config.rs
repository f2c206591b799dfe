// ********* Input data structures ***********

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign};

use snafu::Snafu;

use crate::streams::{ListResource, StreamError, StreamResource};

pub type RoundId = u32;

/// The identifier of a candidate in a contest.
///
/// Identifiers are positive and follow the order of the candidates in the
/// contest, starting at 1.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CandidateId(pub u32);

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Default)]
pub struct VoteCount(pub u64);

impl VoteCount {
    pub const EMPTY: VoteCount = VoteCount(0);

    pub fn checked_add(self, rhs: VoteCount) -> Option<VoteCount> {
        self.0.checked_add(rhs.0).map(VoteCount)
    }
}

// The arithmetic operators saturate. The tabulator checks that the total
// weight of the ballots fits in a u64 before relying on them.

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(VoteCount::EMPTY, |acc, vc| acc + vc)
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        *self = *self + rhs;
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0.saturating_add(rhs.0))
    }
}

impl Display for VoteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ranked ballot.
///
/// The weight is the number of physical ballots that share these choices,
/// which lets normalized ballot sets be stored compactly. The choices are
/// ordered from most preferred to least preferred.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Ballot {
    pub weight: u64,
    pub choices: Vec<CandidateId>,
}

impl Ballot {
    pub fn new(weight: u64, choices: &[u32]) -> Ballot {
        Ballot {
            weight,
            choices: choices.iter().map(|c| CandidateId(*c)).collect(),
        }
    }

    /// The first choice that is still in the running, if any.
    pub fn first_eligible(&self, eligible: &BTreeSet<CandidateId>) -> Option<CandidateId> {
        self.choices.iter().find(|cid| eligible.contains(cid)).copied()
    }
}

/// Returns the candidate numbers for a contest with the given number of
/// candidates.
pub fn make_candidates(candidate_count: usize) -> impl Iterator<Item = CandidateId> {
    (1..=candidate_count as u32).map(CandidateId)
}

/// A single-seat contest: the candidates and the resource holding the ballots.
///
/// Candidate `i` in `candidates` (0-based) has the identifier `i + 1`.
pub struct Contest<R> {
    pub id: u32,
    pub name: Option<String>,
    pub candidates: Vec<String>,
    pub seat_count: u32,
    pub ballots: R,
    pub notes: Vec<String>,
}

impl<R: StreamResource<Item = Ballot>> Contest<R> {
    pub fn new(candidates: Vec<String>, ballots: R) -> Contest<R> {
        Contest {
            id: 0,
            name: None,
            candidates,
            seat_count: 1,
            ballots,
            notes: Vec::new(),
        }
    }

    pub fn candidate_ids(&self) -> impl Iterator<Item = CandidateId> {
        make_candidates(self.candidates.len())
    }

    pub fn candidate_name(&self, cid: CandidateId) -> Option<&str> {
        let idx = (cid.0 as usize).checked_sub(1)?;
        self.candidates.get(idx).map(|s| s.as_str())
    }
}

impl Contest<ListResource<Ballot>> {
    /// A contest with in-memory ballots.
    pub fn from_ballots(candidates: Vec<String>, ballots: Vec<Ballot>) -> Self {
        Contest::new(candidates, ListResource::new(ballots))
    }
}

impl<R> Debug for Contest<R>
where
    R: StreamResource<Item = Ballot>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("candidates", &self.candidates)
            .field("seat_count", &self.seat_count)
            .field("ballots", &self.ballots.describe())
            .finish()
    }
}

// ******** Output data structures *********

/// Statistics for one round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundResults {
    pub round: RoundId,
    /// The totals of all the candidates that entered this round.
    pub totals: BTreeMap<CandidateId, VoteCount>,
    /// The winning threshold of this round
    pub threshold: VoteCount,
    pub elected: Option<CandidateId>,
    pub eliminated: Option<CandidateId>,
}

impl RoundResults {
    pub fn total(&self) -> VoteCount {
        self.totals.values().cloned().sum()
    }
}

/// How the count ended.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ContestOutcome {
    /// A candidate reached the majority threshold.
    Elected {
        candidate: CandidateId,
        round: RoundId,
    },
    /// Several candidates shared the lowest total. No tiebreak is attempted.
    TiedLastPlace {
        candidates: BTreeSet<CandidateId>,
        round: RoundId,
    },
    /// A single candidate is left without any vote. This only happens when
    /// no ballot counts for anyone.
    NoWinner { round: RoundId },
}

impl ContestOutcome {
    pub fn last_round(&self) -> RoundId {
        match self {
            ContestOutcome::Elected { round, .. } => *round,
            ContestOutcome::TiedLastPlace { round, .. } => *round,
            ContestOutcome::NoWinner { round } => *round,
        }
    }

    pub fn winner(&self) -> Option<CandidateId> {
        match self {
            ContestOutcome::Elected { candidate, .. } => Some(*candidate),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ContestResults {
    pub rounds: Vec<RoundResults>,
    pub outcome: ContestOutcome,
}

/// Errors that prevent the count from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TabulationError {
    #[snafu(display("invalid contest {contest}: {reason}"))]
    Configuration { contest: u32, reason: String },
    #[snafu(display("failed to read the ballots in round {round}"))]
    Ballots { round: RoundId, source: StreamError },
}
