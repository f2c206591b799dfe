// Reader for the BLT format.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use irv_counting::internal::{InternalBallotCodec, TempBallots};
use irv_counting::streams::StreamResource;
use irv_counting::{Ballot, CandidateId};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::rcv::*;

/// The content of a BLT file. The ballots have been moved to a temporary
/// store.
#[derive(Debug)]
pub struct BltContest {
    pub title: Option<String>,
    pub candidates: Vec<String>,
    pub seats: u32,
    pub withdrawn: BTreeSet<CandidateId>,
    pub ballot_count: usize,
    pub ballots: TempBallots,
}

struct BltLines<B> {
    lines: Lines<B>,
    lineno: usize,
    path: String,
}

impl<B: BufRead> BltLines<B> {
    /// The next non-blank line.
    fn next_line(&mut self) -> RcvResult<Option<String>> {
        for line in self.lines.by_ref() {
            self.lineno += 1;
            let line = line.context(ReadingBltSnafu { path: &self.path })?;
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
        Ok(None)
    }

    fn expect_line(&mut self, what: &str) -> RcvResult<String> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => self.invalid(format!("missing {}", what)),
        }
    }

    fn parse_numbers(&self, line: &str) -> RcvResult<Vec<i64>> {
        let mut res = Vec::new();
        for token in line.split_whitespace() {
            match token.parse::<i64>() {
                Ok(x) => res.push(x),
                Err(_) => {
                    return self.invalid(format!("{:?} is not a number", token));
                }
            }
        }
        Ok(res)
    }

    fn invalid<T>(&self, reason: impl Into<String>) -> RcvResult<T> {
        InvalidBltSnafu {
            path: &self.path,
            lineno: self.lineno,
            reason,
        }
        .fail()
    }
}

pub fn read_blt(path: &str, spool_size: usize) -> RcvResult<BltContest> {
    info!("Attempting to read BLT file {:?}", path);
    let file = File::open(path).context(OpeningFileSnafu { path })?;
    let ballots = TempBallots::with_max_size(spool_size, InternalBallotCodec);
    read_blt_from(BufReader::new(file), path, ballots)
}

/// Reads a BLT description from `reader`. The ballots are written to
/// `ballots` one at a time as they are parsed.
pub fn read_blt_from<B: BufRead>(
    reader: B,
    path: &str,
    mut ballots: TempBallots,
) -> RcvResult<BltContest> {
    let mut lines = BltLines {
        lines: reader.lines(),
        lineno: 0,
        path: path.to_string(),
    };

    let header = lines.expect_line("header")?;
    let (num_candidates, seats) = match lines.parse_numbers(&header)?.as_slice() {
        [c, s] => match (u32::try_from(*c), u32::try_from(*s)) {
            (Ok(c), Ok(s)) if c > 0 && s > 0 => (c, s),
            _ => {
                return lines.invalid(format!("invalid header {:?}", header));
            }
        },
        _ => {
            return lines.invalid("the header must contain the number of candidates and seats");
        }
    };
    debug!(
        "read_blt_from: {} candidates, {} seats",
        num_candidates, seats
    );

    let mut withdrawn: BTreeSet<CandidateId> = BTreeSet::new();
    let mut ballot_count: usize = 0;
    {
        let mut stream = ballots.writing().context(StoringBallotsSnafu)?;
        loop {
            let line = lines.expect_line("end of ballots")?;
            let numbers = lines.parse_numbers(&line)?;
            if numbers == [0] {
                break;
            }
            if numbers.first().map(|x| *x < 0).unwrap_or(false) {
                if ballot_count > 0 {
                    return lines.invalid("withdrawn candidates must come before the ballots");
                }
                for x in numbers {
                    match x.checked_neg().and_then(|n| candidate_number(n, num_candidates)) {
                        Some(cid) => {
                            withdrawn.insert(cid);
                        }
                        None => {
                            return lines.invalid(format!("{} is not a withdrawn candidate", x));
                        }
                    }
                }
                continue;
            }

            let (weight, rest) = match numbers.split_first() {
                Some((w, rest)) if *w >= 0 => (*w as u64, rest),
                _ => {
                    return lines.invalid("a ballot must start with a non-negative weight");
                }
            };
            let choices = match rest.split_last() {
                Some((0, choices)) => choices,
                _ => {
                    return lines.invalid("a ballot must end with 0");
                }
            };
            let mut ballot = Ballot {
                weight,
                choices: Vec::with_capacity(choices.len()),
            };
            for c in choices {
                let cid = match candidate_number(*c, num_candidates) {
                    Some(cid) => cid,
                    None => {
                        return lines.invalid(format!("{} is not a candidate number", c));
                    }
                };
                if !withdrawn.contains(&cid) {
                    ballot.choices.push(cid);
                }
            }
            stream.write(ballot).context(StoringBallotsSnafu)?;
            ballot_count += 1;
        }
        stream.finish().context(StoringBallotsSnafu)?;
    }

    let mut candidates = Vec::new();
    for _ in 0..num_candidates {
        let line = lines.expect_line("candidate name")?;
        candidates.push(unquote(&lines, &line)?);
    }
    let title = match lines.next_line()? {
        Some(line) => Some(unquote(&lines, &line)?),
        None => None,
    };
    if lines.next_line()?.is_some() {
        warn!(
            "read_blt_from: ignoring the content after line {} of {}",
            lines.lineno - 1,
            path
        );
    }

    for cid in withdrawn.iter() {
        info!(
            "Candidate {} ({}) is withdrawn",
            cid,
            candidates[(cid.0 - 1) as usize]
        );
    }
    info!(
        "Read {} ballots from {} into {}",
        ballot_count,
        path,
        ballots.describe()
    );

    Ok(BltContest {
        title,
        candidates,
        seats,
        withdrawn,
        ballot_count,
        ballots,
    })
}

fn candidate_number(x: i64, num_candidates: u32) -> Option<CandidateId> {
    u32::try_from(x)
        .ok()
        .filter(|c| (1..=num_candidates).contains(c))
        .map(CandidateId)
}

fn unquote<B: BufRead>(lines: &BltLines<B>, line: &str) -> RcvResult<String> {
    match line.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(s) => Ok(s.to_string()),
        None => lines.invalid(format!("expected a quoted string, got {}", line)),
    }
}
