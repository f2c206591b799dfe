pub use crate::config::*;
use crate::config::ConfigurationSnafu;
use crate::streams::ListResource;

use snafu::ensure;

/// A builder for assembling an in-memory contest.
///
/// Unlike the tabulator, which skips them, the builder refuses choices that
/// do not name a candidate of the contest and choices that repeat a
/// candidate.
///
/// ```
/// use irv_counting::builder::Builder;
/// use irv_counting::{count_irv_contest, CandidateId};
/// # use irv_counting::TabulationError;
///
/// let mut builder = Builder::new()
///     .candidates(&["Anna".to_string(), "Bob".to_string()])?;
///
/// builder.add_ballot_simple(&[1, 2])?;
/// builder.add_ballot(2, &[2])?;
///
/// let mut contest = builder.build()?;
/// let results = count_irv_contest(&mut contest)?;
/// assert_eq!(results.outcome.winner(), Some(CandidateId(2)));
/// # Ok::<(), TabulationError>(())
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    pub(crate) _id: u32,
    pub(crate) _name: Option<String>,
    pub(crate) _candidates: Vec<String>,
    pub(crate) _ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn id(self, id: u32) -> Builder {
        Builder { _id: id, ..self }
    }

    pub fn name(self, name: &str) -> Builder {
        Builder {
            _name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the candidates. This drops the ballots added so far, since their
    /// choices refer to the previous candidates.
    pub fn candidates(self, cands: &[String]) -> Result<Builder, TabulationError> {
        ensure!(
            !cands.is_empty(),
            ConfigurationSnafu {
                contest: self._id,
                reason: "the list of candidates is empty",
            }
        );
        Ok(Builder {
            _candidates: cands.to_vec(),
            _ballots: Vec::new(),
            ..self
        })
    }

    /// Adds a single ballot.
    pub fn add_ballot_simple(&mut self, choices: &[u32]) -> Result<(), TabulationError> {
        self.add_ballot(1, choices)
    }

    /// Adds a ballot, with a weight attached to it.
    ///
    /// choices: the candidate numbers (starting at 1) in order of preference.
    pub fn add_ballot(&mut self, weight: u64, choices: &[u32]) -> Result<(), TabulationError> {
        let num_candidates = self._candidates.len() as u32;
        for (idx, c) in choices.iter().enumerate() {
            ensure!(
                *c >= 1 && *c <= num_candidates,
                ConfigurationSnafu {
                    contest: self._id,
                    reason: format!("choice {} is not a candidate number", c),
                }
            );
            ensure!(
                !choices[..idx].contains(c),
                ConfigurationSnafu {
                    contest: self._id,
                    reason: format!("candidate {} is ranked twice", c),
                }
            );
        }
        self._ballots.push(Ballot::new(weight, choices));
        Ok(())
    }

    pub fn build(self) -> Result<Contest<ListResource<Ballot>>, TabulationError> {
        ensure!(
            !self._candidates.is_empty(),
            ConfigurationSnafu {
                contest: self._id,
                reason: "no candidates were provided",
            }
        );
        let mut contest = Contest::from_ballots(self._candidates, self._ballots);
        contest.id = self._id;
        contest.name = self._name;
        Ok(contest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StreamResource;

    fn abc() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn builds_a_contest() {
        let mut builder = Builder::new().id(4).name("Mayor").candidates(&abc()).unwrap();
        builder.add_ballot(5, &[1, 2]).unwrap();
        builder.add_ballot_simple(&[3]).unwrap();
        builder.add_ballot_simple(&[]).unwrap();
        let mut contest = builder.build().unwrap();
        assert_eq!(contest.id, 4);
        assert_eq!(contest.name.as_deref(), Some("Mayor"));
        assert_eq!(contest.candidate_name(CandidateId(2)), Some("B"));
        assert_eq!(contest.candidate_name(CandidateId(4)), None);
        assert_eq!(contest.ballots.count().unwrap(), 3);
        assert_eq!(contest.ballots.items()[0], Ballot::new(5, &[1, 2]));
    }

    #[test]
    fn refuses_bad_choices() {
        let mut builder = Builder::new().candidates(&abc()).unwrap();
        assert!(builder.add_ballot(1, &[4]).is_err());
        assert!(builder.add_ballot(1, &[0]).is_err());
        assert!(builder.add_ballot(1, &[2, 1, 2]).is_err());
        assert!(builder.add_ballot(1, &[2, 1, 3]).is_ok());
    }

    #[test]
    fn needs_candidates() {
        assert!(Builder::new().candidates(&[]).is_err());
        assert!(Builder::new().build().is_err());
    }
}
