mod config;
pub mod builder;
pub mod internal;
pub mod manual;
pub mod normalize;
pub mod streams;

use log::{debug, info};
use snafu::{ensure, ResultExt};

use std::collections::{BTreeMap, BTreeSet};

pub use crate::config::*;
use crate::config::{BallotsSnafu, ConfigurationSnafu};
use crate::streams::{OverflowSnafu, StreamError, StreamResource};

/// Returns the majority threshold for a single-winner election.
///
/// Note that this returns 1 for a total of 0: nobody can be elected without
/// votes.
pub fn get_majority(total: VoteCount) -> VoteCount {
    VoteCount(total.0 / 2 + 1)
}

/// Returns the candidate with a majority, if any.
pub fn get_winner(totals: &BTreeMap<CandidateId, VoteCount>) -> Option<CandidateId> {
    let total: VoteCount = totals.values().cloned().sum();
    let threshold = get_majority(total);
    totals
        .iter()
        .find(|(_, count)| **count >= threshold)
        .map(|(cid, _)| *cid)
}

/// Returns all the candidates that share the lowest total.
pub fn get_lowest(totals: &BTreeMap<CandidateId, VoteCount>) -> BTreeSet<CandidateId> {
    let min_count = match totals.values().min() {
        Some(vc) => *vc,
        None => return BTreeSet::new(),
    };
    totals
        .iter()
        .filter_map(|(cid, vc)| if *vc == min_count { Some(*cid) } else { None })
        .collect()
}

/// Runs an instant-runoff count over a contest.
///
/// The ballots are read again from the contest's resource in every round, so
/// they never need to be held in memory at once.
pub struct Tabulator<'a, R> {
    contest: &'a mut Contest<R>,
}

impl<'a, R: StreamResource<Item = Ballot>> Tabulator<'a, R> {
    pub fn new(contest: &'a mut Contest<R>) -> Tabulator<'a, R> {
        Tabulator { contest }
    }

    /// Counts one round.
    ///
    /// Every ballot goes to its highest ranked candidate among `eligible`.
    /// Ballots without such a candidate are not counted. Choices that are not
    /// candidates of the contest are skipped like eliminated candidates.
    pub fn count_ballots(
        &mut self,
        eligible: &BTreeSet<CandidateId>,
    ) -> Result<BTreeMap<CandidateId, VoteCount>, StreamError> {
        // Initialize the tally with all the candidates, to capture the ones
        // that do not get any vote.
        let mut totals: BTreeMap<CandidateId, VoteCount> = eligible
            .iter()
            .map(|cid| (*cid, VoteCount::EMPTY))
            .collect();
        let mut exhausted = VoteCount::EMPTY;
        // Every partial sum below is bounded by this one.
        let mut grand_total = VoteCount::EMPTY;

        let mut ballots = self.contest.ballots.reading()?;
        while let Some(ballot) = ballots.next() {
            let ballot = ballot?;
            let count = VoteCount(ballot.weight);
            grand_total = match grand_total.checked_add(count) {
                Some(vc) => vc,
                None => {
                    let err = OverflowSnafu { label: "ballot" }.build();
                    return Err(ballots.wrap_error(err));
                }
            };
            match ballot.first_eligible(eligible) {
                Some(cid) => {
                    if let Some(vc) = totals.get_mut(&cid) {
                        *vc += count;
                    }
                }
                None => exhausted += count,
            }
        }
        debug!("count_ballots: totals: {:?} exhausted: {}", totals, exhausted);
        Ok(totals)
    }

    fn check_contest(&self) -> Result<(), TabulationError> {
        let contest = &self.contest;
        ensure!(
            !contest.candidates.is_empty(),
            ConfigurationSnafu {
                contest: contest.id,
                reason: "the contest has no candidates",
            }
        );
        ensure!(
            contest.seat_count == 1,
            ConfigurationSnafu {
                contest: contest.id,
                reason: format!(
                    "{} seats requested, only single-seat contests can be counted",
                    contest.seat_count
                ),
            }
        );
        Ok(())
    }

    /// Runs rounds until a candidate has a majority or the last place is tied.
    pub fn count(&mut self) -> Result<ContestResults, TabulationError> {
        self.check_contest()?;
        info!(
            "Counting contest {} ({:?}) with ballots from {}",
            self.contest.id,
            self.contest.name,
            self.contest.ballots.describe()
        );
        for (idx, name) in self.contest.candidates.iter().enumerate() {
            info!("Candidate: {}: {}", idx + 1, name);
        }

        let mut eligible: BTreeSet<CandidateId> = self.contest.candidate_ids().collect();
        let mut rounds: Vec<RoundResults> = Vec::new();

        // Every round either stops or removes one candidate, so there are at
        // most as many rounds as candidates.
        let outcome = loop {
            let round = rounds.len() as RoundId + 1;
            let totals = self
                .count_ballots(&eligible)
                .context(BallotsSnafu { round })?;
            let threshold = get_majority(totals.values().cloned().sum());
            info!("Round {} (winning threshold: {})", round, threshold);
            for (cid, vc) in totals.iter() {
                info!("      {} {}", vc, cid);
            }
            let mut round_results = RoundResults {
                round,
                totals,
                threshold,
                elected: None,
                eliminated: None,
            };

            if let Some(winner) = get_winner(&round_results.totals) {
                info!("Round {}: candidate {} elected", round, winner);
                round_results.elected = Some(winner);
                rounds.push(round_results);
                break ContestOutcome::Elected {
                    candidate: winner,
                    round,
                };
            }

            let last_place = get_lowest(&round_results.totals);
            if last_place.len() > 1 {
                info!("Round {}: tie for last place: {:?}", round, last_place);
                rounds.push(round_results);
                break ContestOutcome::TiedLastPlace {
                    candidates: last_place,
                    round,
                };
            }

            match last_place.iter().next() {
                Some(loser) if eligible.len() > 1 => {
                    info!("Round {}: candidate {} eliminated", round, loser);
                    eligible.remove(loser);
                    round_results.eliminated = Some(*loser);
                    rounds.push(round_results);
                }
                _ => {
                    // A lone candidate short of the threshold: nothing was counted.
                    info!("Round {}: no candidate received any vote", round);
                    rounds.push(round_results);
                    break ContestOutcome::NoWinner { round };
                }
            }
        };

        debug!("count: outcome: {:?}", outcome);
        Ok(ContestResults { rounds, outcome })
    }
}

/// Tabulates a contest using IRV.
pub fn count_irv_contest<R>(contest: &mut Contest<R>) -> Result<ContestResults, TabulationError>
where
    R: StreamResource<Item = Ballot>,
{
    Tabulator::new(contest).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::{InternalBallotCodec, InternalBallotsFile, InternalBallotsString, TempBallots};
    use crate::streams::{ItemIter, ItemSink, NullResource, StreamResource, StreamResult};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Candidate {}", i)).collect()
    }

    fn run(n: usize, ballots: Vec<Ballot>) -> ContestResults {
        init();
        let mut contest = Contest::from_ballots(names(n), ballots);
        count_irv_contest(&mut contest).unwrap()
    }

    fn totals(pairs: &[(u32, u64)]) -> BTreeMap<CandidateId, VoteCount> {
        pairs
            .iter()
            .map(|(c, v)| (CandidateId(*c), VoteCount(*v)))
            .collect()
    }

    fn ids(cs: &[u32]) -> BTreeSet<CandidateId> {
        cs.iter().map(|c| CandidateId(*c)).collect()
    }

    #[test]
    fn majority_threshold() {
        assert_eq!(get_majority(VoteCount(0)), VoteCount(1));
        assert_eq!(get_majority(VoteCount(1)), VoteCount(1));
        assert_eq!(get_majority(VoteCount(9)), VoteCount(5));
        assert_eq!(get_majority(VoteCount(10)), VoteCount(6));
        for t in 0..200u64 {
            assert_eq!(get_majority(VoteCount(t)), VoteCount(t / 2 + 1));
        }
    }

    #[test]
    fn winner_and_lowest() {
        assert_eq!(get_winner(&totals(&[(1, 5), (2, 3), (3, 2)])), None);
        assert_eq!(
            get_winner(&totals(&[(1, 7), (2, 3)])),
            Some(CandidateId(1))
        );
        assert_eq!(get_winner(&totals(&[(1, 0), (2, 0)])), None);
        assert_eq!(get_lowest(&totals(&[(1, 5), (2, 3), (3, 2)])), ids(&[3]));
        assert_eq!(get_lowest(&totals(&[(1, 2), (2, 3), (3, 2)])), ids(&[1, 3]));
        assert!(get_lowest(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn winner_in_second_round() {
        let res = run(
            3,
            vec![
                Ballot::new(5, &[1, 2]),
                Ballot::new(3, &[2, 1]),
                Ballot::new(2, &[3, 1]),
            ],
        );
        assert_eq!(res.rounds.len(), 2);
        assert_eq!(res.rounds[0].totals, totals(&[(1, 5), (2, 3), (3, 2)]));
        assert_eq!(res.rounds[0].threshold, VoteCount(6));
        assert_eq!(res.rounds[0].elected, None);
        assert_eq!(res.rounds[0].eliminated, Some(CandidateId(3)));
        assert_eq!(res.rounds[1].totals, totals(&[(1, 7), (2, 3)]));
        assert_eq!(res.rounds[1].elected, Some(CandidateId(1)));
        assert_eq!(
            res.outcome,
            ContestOutcome::Elected {
                candidate: CandidateId(1),
                round: 2
            }
        );
        assert_eq!(res.outcome.last_round(), 2);
    }

    #[test]
    fn transfers_over_several_rounds() {
        let res = run(
            4,
            vec![
                Ballot::new(4, &[1]),
                Ballot::new(3, &[2, 3]),
                Ballot::new(2, &[3, 2]),
                Ballot::new(1, &[4, 2]),
            ],
        );
        assert_eq!(res.rounds.len(), 3);
        assert_eq!(res.rounds[1].totals, totals(&[(1, 4), (2, 4), (3, 2)]));
        assert_eq!(res.rounds[2].totals, totals(&[(1, 4), (2, 6)]));
        assert_eq!(res.outcome.winner(), Some(CandidateId(2)));
        // One candidate fewer in every round.
        for (idx, r) in res.rounds.iter().enumerate() {
            assert_eq!(r.totals.len(), 4 - idx);
            assert_eq!(r.round as usize, idx + 1);
        }
    }

    #[test]
    fn exhausted_ballots_lower_the_total() {
        let res = run(
            3,
            vec![
                Ballot::new(4, &[1]),
                Ballot::new(3, &[2]),
                Ballot::new(2, &[3]),
            ],
        );
        assert_eq!(res.rounds[0].total(), VoteCount(9));
        assert_eq!(res.rounds[1].total(), VoteCount(7));
        assert_eq!(res.rounds[1].threshold, VoteCount(4));
        assert_eq!(
            res.outcome,
            ContestOutcome::Elected {
                candidate: CandidateId(1),
                round: 2
            }
        );
        let mut previous = VoteCount(u64::MAX);
        for r in res.rounds.iter() {
            assert!(r.total() <= previous);
            previous = r.total();
        }
    }

    #[test]
    fn three_way_tie_for_last_place() {
        let res = run(
            4,
            vec![
                Ballot::new(5, &[4]),
                Ballot::new(2, &[1]),
                Ballot::new(2, &[2]),
                Ballot::new(2, &[3]),
            ],
        );
        assert_eq!(res.rounds.len(), 1);
        assert_eq!(
            res.outcome,
            ContestOutcome::TiedLastPlace {
                candidates: ids(&[1, 2, 3]),
                round: 1
            }
        );
    }

    #[test]
    fn tie_after_an_elimination() {
        let res = run(
            4,
            vec![
                Ballot::new(4, &[1]),
                Ballot::new(3, &[2, 3]),
                Ballot::new(2, &[3, 2]),
                Ballot::new(1, &[4, 3]),
            ],
        );
        assert_eq!(res.rounds[0].eliminated, Some(CandidateId(4)));
        assert_eq!(
            res.outcome,
            ContestOutcome::TiedLastPlace {
                candidates: ids(&[2, 3]),
                round: 2
            }
        );
    }

    #[test]
    fn single_candidate_wins_in_first_round() {
        let res = run(1, vec![Ballot::new(1, &[1])]);
        assert_eq!(
            res.outcome,
            ContestOutcome::Elected {
                candidate: CandidateId(1),
                round: 1
            }
        );
    }

    // Without ballots the threshold is 1 and nobody can reach it.
    #[test]
    fn zero_ballots() {
        init();
        let mut contest = Contest::new(names(1), NullResource::<Ballot>::new());
        let res = count_irv_contest(&mut contest).unwrap();
        assert_eq!(res.rounds.len(), 1);
        assert_eq!(res.rounds[0].threshold, VoteCount(1));
        assert_eq!(res.outcome, ContestOutcome::NoWinner { round: 1 });

        let mut contest = Contest::new(names(3), NullResource::<Ballot>::new());
        let res = count_irv_contest(&mut contest).unwrap();
        assert_eq!(
            res.outcome,
            ContestOutcome::TiedLastPlace {
                candidates: ids(&[1, 2, 3]),
                round: 1
            }
        );
    }

    #[test]
    fn zero_weight_ballots_do_not_count() {
        let res = run(2, vec![Ballot::new(0, &[1]), Ballot::new(0, &[2, 1])]);
        assert_eq!(res.rounds[0].total(), VoteCount(0));
        assert_eq!(res.outcome.winner(), None);
    }

    #[test]
    fn unknown_choices_are_skipped() {
        let res = run(
            2,
            vec![Ballot::new(3, &[7, 2]), Ballot::new(2, &[1]), Ballot::new(4, &[])],
        );
        assert_eq!(res.rounds[0].totals, totals(&[(1, 2), (2, 3)]));
        assert_eq!(res.outcome.winner(), Some(CandidateId(2)));
    }

    #[test]
    fn first_round_counts_first_choices() {
        let ballots = vec![
            Ballot::new(2, &[3, 1]),
            Ballot::new(6, &[2]),
            Ballot::new(1, &[1, 3]),
            Ballot::new(5, &[3]),
            Ballot::new(3, &[]),
        ];
        let expected: u64 = ballots
            .iter()
            .filter(|b| !b.choices.is_empty())
            .map(|b| b.weight)
            .sum();
        let res = run(3, ballots);
        assert_eq!(res.rounds[0].total(), VoteCount(expected));
        assert!(res.rounds.len() <= 3);
    }

    #[test]
    fn contest_without_candidates() {
        let mut contest = Contest::from_ballots(vec![], vec![Ballot::new(1, &[1])]);
        let err = count_irv_contest(&mut contest).unwrap_err();
        assert!(matches!(err, TabulationError::Configuration { .. }));
    }

    #[test]
    fn multi_seat_contest_is_refused() {
        let mut contest = Contest::from_ballots(names(3), vec![Ballot::new(1, &[1])]);
        contest.seat_count = 2;
        let err = count_irv_contest(&mut contest).unwrap_err();
        assert!(matches!(err, TabulationError::Configuration { .. }));
    }

    /// Counts the passes over the wrapped resource.
    struct CountingReads<R> {
        inner: R,
        passes: usize,
    }

    impl<R: StreamResource> StreamResource for CountingReads<R> {
        type Item = R::Item;

        fn open_read(&mut self) -> StreamResult<ItemIter<'_, R::Item>> {
            self.passes += 1;
            self.inner.open_read()
        }

        fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<R::Item> + '_>> {
            self.inner.open_write()
        }

        fn describe(&self) -> String {
            format!("CountingReads({})", self.inner.describe())
        }
    }

    #[test]
    fn ballots_are_read_once_per_round() {
        init();
        let mut resource = TempBallots::with_max_size(64, InternalBallotCodec);
        {
            let mut stream = resource.writing().unwrap();
            for _ in 0..50 {
                stream.write(Ballot::new(1, &[1, 2])).unwrap();
                stream.write(Ballot::new(1, &[2, 1])).unwrap();
                stream.write(Ballot::new(1, &[3, 1])).unwrap();
            }
            stream.write(Ballot::new(1, &[3, 1])).unwrap();
            stream.write(Ballot::new(1, &[2, 3])).unwrap();
            stream.finish().unwrap();
        }
        let mut contest = Contest::new(
            names(3),
            CountingReads {
                inner: resource,
                passes: 0,
            },
        );
        let res = count_irv_contest(&mut contest).unwrap();
        assert!(contest.ballots.inner.is_on_disk());
        assert_eq!(res.rounds.len(), 2);
        assert_eq!(contest.ballots.passes, 2);
        assert_eq!(res.rounds[0].totals, totals(&[(1, 50), (2, 51), (3, 51)]));
        assert_eq!(res.rounds[0].threshold, VoteCount(77));
        assert_eq!(res.rounds[1].totals, totals(&[(2, 101), (3, 51)]));
        assert_eq!(
            res.outcome,
            ContestOutcome::Elected {
                candidate: CandidateId(2),
                round: 2
            }
        );
    }

    #[test]
    fn weight_overflow_aborts_the_count() {
        init();
        let mut contest = Contest::from_ballots(
            names(2),
            vec![
                Ballot::new(u64::MAX, &[1]),
                Ballot::new(1, &[1]),
                Ballot::new(5, &[2]),
            ],
        );
        match count_irv_contest(&mut contest).unwrap_err() {
            TabulationError::Ballots { round, source } => {
                assert_eq!(round, 1);
                assert!(matches!(source, StreamError::Read { number: 2, .. }));
                assert!(matches!(source.root(), StreamError::Overflow { .. }));
            }
            x => panic!("unexpected {:?}", x),
        }

        // Large weights that fit are counted exactly.
        let mut contest = Contest::from_ballots(
            names(2),
            vec![Ballot::new(u64::MAX - 5, &[1]), Ballot::new(5, &[2])],
        );
        let res = count_irv_contest(&mut contest).unwrap();
        assert_eq!(res.rounds[0].total(), VoteCount(u64::MAX));
        assert_eq!(res.outcome.winner(), Some(CandidateId(1)));
    }

    #[test]
    fn malformed_ballot_aborts_the_count() {
        init();
        let resource = InternalBallotsString::with_contents("1 1\n2 2 1\n1 x\n", InternalBallotCodec);
        let mut contest = Contest::new(names(2), resource);
        let err = count_irv_contest(&mut contest).unwrap_err();
        match &err {
            TabulationError::Ballots { round, source } => {
                assert_eq!(*round, 1);
                assert!(matches!(source, StreamError::Read { number: 2, .. }));
                assert!(matches!(source.root(), StreamError::Malformed { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn missing_ballot_file() {
        let dir = tempfile::tempdir().unwrap();
        let resource = InternalBallotsFile::new(dir.path().join("nope.txt"), InternalBallotCodec);
        let mut contest = Contest::new(names(2), resource);
        let err = count_irv_contest(&mut contest).unwrap_err();
        match err {
            TabulationError::Ballots { round: 1, source } => assert!(source.is_resource_error()),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
