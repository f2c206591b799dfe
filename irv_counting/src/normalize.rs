use std::collections::BTreeMap;

use log::{debug, info};

use crate::config::{Ballot, CandidateId};
use crate::streams::{OverflowSnafu, StreamResource, StreamResult};

/// What a normalization pass did.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct NormalizeStats {
    pub ballots_read: usize,
    pub ballots_written: usize,
    pub total_weight: u64,
}

/// Normalizes ballots by ordering and compressing them.
///
/// The ballots of `source` are grouped by their list of choices, the weights
/// of each group are summed, and one ballot per group is written to `target`
/// in the lexicographic order of the choices. A list of choices sorts before
/// any longer list that it is a prefix of.
///
/// The total weight is preserved, and normalizing normalized ballots does not
/// change them.
pub fn normalize_ballots<S, T>(source: &mut S, target: &mut T) -> StreamResult<NormalizeStats>
where
    S: StreamResource<Item = Ballot>,
    T: StreamResource<Item = Ballot>,
{
    let mut stats = NormalizeStats::default();
    // Vec ordering is already lexicographic, so the map is kept sorted.
    let mut weights: BTreeMap<Vec<CandidateId>, u64> = BTreeMap::new();
    {
        let mut ballots = source.reading()?;
        while let Some(ballot) = ballots.next() {
            let Ballot { weight, choices } = ballot?;
            stats.ballots_read += 1;
            stats.total_weight = match stats.total_weight.checked_add(weight) {
                Some(w) => w,
                None => {
                    let err = OverflowSnafu { label: "ballot" }.build();
                    return Err(ballots.wrap_error(err));
                }
            };
            // Bounded by the total weight, which did not overflow.
            *weights.entry(choices).or_insert(0) += weight;
        }
    }
    debug!(
        "normalize_ballots: {} ballots, {} distinct choices",
        stats.ballots_read,
        weights.len()
    );

    let mut ballots = target.writing()?;
    for (choices, weight) in weights {
        ballots.write(Ballot { weight, choices })?;
        stats.ballots_written += 1;
    }
    ballots.finish()?;
    info!(
        "Normalized {} ballots into {} (total weight {})",
        stats.ballots_read, stats.ballots_written, stats.total_weight
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::{InternalBallotCodec, InternalBallotsString, TempBallots};
    use crate::streams::{ListResource, NullResource, StreamError};

    fn sample() -> Vec<Ballot> {
        vec![
            Ballot::new(1, &[2, 1]),
            Ballot::new(2, &[1, 2, 3]),
            Ballot::new(1, &[2]),
            Ballot::new(3, &[1, 2]),
            Ballot::new(4, &[2, 1]),
            Ballot::new(1, &[]),
            Ballot::new(5, &[1, 2]),
        ]
    }

    #[test]
    fn orders_and_compresses() {
        let mut source = ListResource::new(sample());
        let mut target = ListResource::new(vec![Ballot::new(9, &[9])]);
        let stats = normalize_ballots(&mut source, &mut target).unwrap();
        assert_eq!(
            target.items(),
            &[
                Ballot::new(1, &[]),
                Ballot::new(8, &[1, 2]),
                Ballot::new(2, &[1, 2, 3]),
                Ballot::new(1, &[2]),
                Ballot::new(5, &[2, 1]),
            ]
        );
        assert_eq!(
            stats,
            NormalizeStats {
                ballots_read: 7,
                ballots_written: 5,
                total_weight: 17,
            }
        );
    }

    #[test]
    fn is_idempotent() {
        let mut source = ListResource::new(sample());
        let mut once = ListResource::default();
        let mut twice = ListResource::default();
        normalize_ballots(&mut source, &mut once).unwrap();
        let stats = normalize_ballots(&mut once, &mut twice).unwrap();
        assert_eq!(once.items(), twice.items());
        assert_eq!(stats.ballots_read, stats.ballots_written);
    }

    #[test]
    fn conserves_weight() {
        let mut source = ListResource::new(sample());
        let mut target = ListResource::default();
        normalize_ballots(&mut source, &mut target).unwrap();
        let before: u64 = source.items().iter().map(|b| b.weight).sum();
        let after: u64 = target.items().iter().map(|b| b.weight).sum();
        assert_eq!(before, after);
        assert!(target.items().len() <= source.items().len());
    }

    #[test]
    fn through_text_resources() {
        let mut source =
            InternalBallotsString::with_contents("2 3 1\n1 1\n4 3 1\n0 2\n", InternalBallotCodec);
        let mut target = TempBallots::new(InternalBallotCodec);
        normalize_ballots(&mut source, &mut target).unwrap();
        let mut out = InternalBallotsString::new(InternalBallotCodec);
        normalize_ballots(&mut target, &mut out).unwrap();
        assert_eq!(out.contents(), "1 1\n0 2\n6 3 1\n");
    }

    #[test]
    fn total_weight_overflow_fails() {
        let mut source = ListResource::new(vec![
            Ballot::new(u64::MAX, &[1]),
            Ballot::new(2, &[2]),
            Ballot::new(1, &[1]),
        ]);
        let mut target = ListResource::default();
        let err = normalize_ballots(&mut source, &mut target).unwrap_err();
        assert!(matches!(err, StreamError::Read { number: 2, .. }));
        assert!(matches!(err.root(), StreamError::Overflow { .. }));
        assert!(target.items().is_empty());
    }

    #[test]
    fn read_only_target_fails() {
        let mut source = ListResource::new(sample());
        let mut target: NullResource<Ballot> = NullResource::new();
        let err = normalize_ballots(&mut source, &mut target).unwrap_err();
        assert!(matches!(err, StreamError::ReadOnly { .. }));
    }
}
