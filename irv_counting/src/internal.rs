//! The internal ballot format.
//!
//! One ballot per line: the weight followed by the choices, most preferred
//! first, separated by whitespace. For example `3 2 1 4` is a ballot of
//! weight 3 ranking candidate 2, then 1, then 4. A line with a weight and no
//! choice is an empty ballot.

use crate::config::{Ballot, CandidateId};
use crate::streams::{
    FileResource, LineCodec, MalformedSnafu, StreamResult, StringResource, TempResource,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct InternalBallotCodec;

pub type InternalBallotsFile = FileResource<InternalBallotCodec>;
pub type InternalBallotsString = StringResource<InternalBallotCodec>;
pub type TempBallots = TempResource<InternalBallotCodec>;

pub fn parse_internal_ballot(line: &str) -> StreamResult<Ballot> {
    let mut parts = line.split_whitespace();
    let weight = match parts.next() {
        Some(w) => w.parse::<u64>().ok().ok_or_else(|| {
            MalformedSnafu {
                label: "ballot",
                line,
                reason: format!("invalid weight {:?}", w),
            }
            .build()
        })?,
        None => {
            return MalformedSnafu {
                label: "ballot",
                line,
                reason: "empty line",
            }
            .fail()
        }
    };
    let mut choices: Vec<CandidateId> = Vec::new();
    for part in parts {
        match part.parse::<u32>() {
            Ok(c) if c > 0 => choices.push(CandidateId(c)),
            _ => {
                return MalformedSnafu {
                    label: "ballot",
                    line,
                    reason: format!("invalid choice {:?}", part),
                }
                .fail()
            }
        }
    }
    Ok(Ballot { weight, choices })
}

pub fn to_internal_ballot(ballot: &Ballot) -> String {
    let mut line = ballot.weight.to_string();
    for cid in ballot.choices.iter() {
        line.push(' ');
        line.push_str(&cid.0.to_string());
    }
    line
}

impl LineCodec for InternalBallotCodec {
    type Item = Ballot;

    fn label(&self) -> &'static str {
        "ballot"
    }

    fn parse_line(&self, line: &str) -> StreamResult<Ballot> {
        parse_internal_ballot(line)
    }

    fn format_item(&self, item: &Ballot) -> String {
        to_internal_ballot(item)
    }
}
