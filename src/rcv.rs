use log::{debug, info, warn};

use irv_counting::internal::{InternalBallotCodec, InternalBallotsFile, TempBallots};
use irv_counting::normalize::normalize_ballots;
use irv_counting::streams::{StreamError, StreamResource, DEFAULT_SPOOL_SIZE};
use irv_counting::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::rcv::config_reader::*;
use crate::rcv::io_common::*;

pub mod io_blt;
pub mod io_common;

#[derive(Debug, Snafu)]
pub enum RcvError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile { source: std::io::Error, path: String },
    #[snafu(display("Error parsing JSON in {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error formatting the summary"))]
    FormattingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile { source: std::io::Error, path: String },
    #[snafu(display("The configuration file {path} has no parent directory"))]
    MissingParentDir { path: String },
    #[snafu(display("No ballots to count: pass --input or a configuration with a ballotSource"))]
    MissingInput {},
    #[snafu(display("Candidate name {name:?} is used more than once"))]
    DuplicateCandidate { name: String },
    #[snafu(display("Unknown input type {input_type:?} (expected internal or blt)"))]
    UnknownInputType { input_type: String },

    #[snafu(display("Error reading BLT file {path}"))]
    ReadingBlt { source: std::io::Error, path: String },
    #[snafu(display("Invalid BLT file {path}, line {lineno}: {reason}"))]
    InvalidBlt {
        path: String,
        lineno: usize,
        reason: String,
    },
    #[snafu(display("Error storing the ballots"))]
    StoringBallots { source: StreamError },
    #[snafu(display("Error reading the ballots of {path}"))]
    ReadingBallots { source: StreamError, path: String },
    #[snafu(display("Error normalizing the ballots"))]
    Normalizing { source: StreamError },
    #[snafu(display("Error counting the contest"))]
    Tabulating { source: TabulationError },

    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},
}

type RcvResult<T> = Result<T, RcvError>;

/// Where the ballots are read from during the count.
type BallotSource = Box<dyn StreamResource<Item = Ballot>>;

pub mod config_reader {
    use crate::rcv::*;

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct FileSource {
        pub provider: String,
        #[serde(rename = "filePath")]
        pub file_path: String,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ContestConfig {
        #[serde(rename = "contestName")]
        pub contest_name: String,
        #[serde(rename = "contestId")]
        pub contest_id: Option<u32>,
        #[serde(default)]
        pub candidates: Vec<String>,
        #[serde(rename = "seatCount")]
        pub seat_count: Option<u32>,
        #[serde(rename = "ballotSource")]
        pub ballot_source: Option<FileSource>,
        pub notes: Option<Vec<String>>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub contest: String,
        pub id: u32,
        pub candidates: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        pub notes: Vec<String>,
    }

    pub fn read_config(path: &str) -> RcvResult<ContestConfig> {
        let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
        let config: ContestConfig =
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
        info!("config: {:?}", config);
        Ok(config)
    }

    pub fn read_summary(path: &str) -> RcvResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
        Ok(js)
    }
}

/// The ballots, with what their file says about the contest.
struct LoadedBallots {
    ballots: BallotSource,
    candidates: Option<Vec<String>>,
    seats: Option<u32>,
    title: Option<String>,
}

fn default_input_type(path: &str) -> String {
    if path.to_lowercase().ends_with(".blt") {
        "blt".to_string()
    } else {
        "internal".to_string()
    }
}

/// The ballot file and its type. The command line takes precedence over the
/// configuration.
fn ballot_source(
    args: &Args,
    config: Option<&ContestConfig>,
    config_path: Option<&str>,
) -> RcvResult<(String, String)> {
    if let Some(input) = &args.input {
        let input_type = args
            .input_type
            .clone()
            .unwrap_or_else(|| default_input_type(input));
        return Ok((input.clone(), input_type));
    }
    match (config.and_then(|c| c.ballot_source.as_ref()), config_path) {
        (Some(source), Some(config_path)) => {
            let root = Path::new(config_path)
                .parent()
                .context(MissingParentDirSnafu { path: config_path })?;
            let input_type = args
                .input_type
                .clone()
                .unwrap_or_else(|| source.provider.clone());
            Ok((resolve_path(root, &source.file_path), input_type))
        }
        _ => MissingInputSnafu {}.fail(),
    }
}

fn load_ballots(path: &str, input_type: &str, spool_size: usize) -> RcvResult<LoadedBallots> {
    match input_type {
        "internal" => {
            info!("Reading ballots in the internal format from {:?}", path);
            Ok(LoadedBallots {
                ballots: Box::new(InternalBallotsFile::new(path, InternalBallotCodec)),
                candidates: None,
                seats: None,
                title: None,
            })
        }
        "blt" => {
            let blt = io_blt::read_blt(path, spool_size)?;
            Ok(LoadedBallots {
                ballots: Box::new(blt.ballots),
                candidates: Some(blt.candidates),
                seats: Some(blt.seats),
                title: blt.title,
            })
        }
        x => UnknownInputTypeSnafu { input_type: x }.fail(),
    }
}

/// Replaces the ballots by their normalized version, if requested.
fn normalize_source(
    args: &Args,
    mut ballots: BallotSource,
    spool_size: usize,
) -> RcvResult<BallotSource> {
    if let Some(out) = &args.normalized_out {
        let mut target = InternalBallotsFile::new(out, InternalBallotCodec);
        normalize_ballots(&mut ballots, &mut target).context(NormalizingSnafu)?;
        info!("Normalized ballots written to {:?}", out);
        Ok(Box::new(target))
    } else if args.normalize {
        let mut target = TempBallots::with_max_size(spool_size, InternalBallotCodec);
        normalize_ballots(&mut ballots, &mut target).context(NormalizingSnafu)?;
        Ok(Box::new(target))
    } else {
        Ok(ballots)
    }
}

fn candidate_label<R>(contest: &Contest<R>, cid: CandidateId) -> String
where
    R: StreamResource<Item = Ballot>,
{
    contest
        .candidate_name(cid)
        .map(|s| s.to_string())
        .unwrap_or_else(|| cid.to_string())
}

fn result_stats_to_json<R>(contest: &Contest<R>, rs: &ContestResults) -> Vec<JSValue>
where
    R: StreamResource<Item = Ballot>,
{
    let mut l: Vec<JSValue> = Vec::new();
    for round_stat in rs.rounds.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (cid, count) in round_stat.totals.iter() {
            tally.insert(candidate_label(contest, *cid), json!(count.to_string()));
        }

        let mut tally_results: Vec<JSValue> = Vec::new();
        if let Some(cid) = round_stat.eliminated {
            tally_results.push(json!({ "eliminated": candidate_label(contest, cid) }));
        }
        if let Some(cid) = round_stat.elected {
            tally_results.push(json!({ "elected": candidate_label(contest, cid) }));
        }

        let js = json!({
            "round": round_stat.round,
            "tally": tally,
            "threshold": round_stat.threshold.to_string(),
            "tallyResults": tally_results
        });
        l.push(js);
    }
    l
}

fn outcome_to_json<R>(contest: &Contest<R>, outcome: &ContestOutcome) -> JSValue
where
    R: StreamResource<Item = Ballot>,
{
    match outcome {
        ContestOutcome::Elected { candidate, round } => json!({
            "type": "elected",
            "elected": candidate_label(contest, *candidate),
            "round": round
        }),
        ContestOutcome::TiedLastPlace { candidates, round } => {
            let names: Vec<String> = candidates
                .iter()
                .map(|cid| candidate_label(contest, *cid))
                .collect();
            json!({ "type": "tiedLastPlace", "tied": names, "round": round })
        }
        ContestOutcome::NoWinner { round } => json!({ "type": "noWinner", "round": round }),
    }
}

fn build_summary_js<R>(contest: &Contest<R>, rs: &ContestResults) -> JSValue
where
    R: StreamResource<Item = Ballot>,
{
    let c = OutputConfig {
        contest: contest.name.clone().unwrap_or_default(),
        id: contest.id,
        candidates: contest.candidates.clone(),
        notes: contest.notes.clone(),
    };
    json!({
        "config": c,
        "results": result_stats_to_json(contest, rs),
        "outcome": outcome_to_json(contest, &rs.outcome)
    })
}

fn log_results<R>(contest: &Contest<R>, rs: &ContestResults)
where
    R: StreamResource<Item = Ballot>,
{
    for round_stat in rs.rounds.iter() {
        debug!(
            "Round {} (winning threshold: {})",
            round_stat.round, round_stat.threshold
        );
        for (cid, count) in round_stat.totals.iter() {
            let status = if round_stat.elected == Some(*cid) {
                " -> elected"
            } else if round_stat.eliminated == Some(*cid) {
                " -> eliminated"
            } else {
                ""
            };
            debug!("{:7} {}{}", count, candidate_label(contest, *cid), status);
        }
    }
    match &rs.outcome {
        ContestOutcome::Elected { candidate, round } => info!(
            "{} is elected in round {}",
            candidate_label(contest, *candidate),
            round
        ),
        ContestOutcome::TiedLastPlace { candidates, round } => warn!(
            "No winner: tie for the last place between {:?} in round {}",
            candidates
                .iter()
                .map(|cid| candidate_label(contest, *cid))
                .collect::<Vec<String>>(),
            round
        ),
        ContestOutcome::NoWinner { round } => {
            warn!("No winner: no vote was counted in round {}", round)
        }
    }
}

fn write_summary(out: Option<&str>, pretty_js_stats: &str) -> RcvResult<()> {
    match out {
        None | Some("stdout") => {
            println!("{}", pretty_js_stats);
        }
        Some(path) => {
            fs::write(path, pretty_js_stats).context(WritingFileSnafu { path })?;
            info!("Summary written to {:?}", path);
        }
    }
    Ok(())
}

pub fn run_election(args: &Args) -> RcvResult<()> {
    let config = match &args.config {
        Some(path) => Some(read_config(path)?),
        None => None,
    };
    let spool_size = args.spool_size.unwrap_or(DEFAULT_SPOOL_SIZE);

    let (path, input_type) = ballot_source(args, config.as_ref(), args.config.as_deref())?;
    let mut loaded = load_ballots(&path, &input_type, spool_size)?;

    let candidates = match (&config, loaded.candidates.take()) {
        (Some(c), from_file) if !c.candidates.is_empty() => {
            if let Some(names) = from_file {
                if names.len() != c.candidates.len() {
                    warn!(
                        "The configuration lists {} candidates, the ballot file {}",
                        c.candidates.len(),
                        names.len()
                    );
                }
            }
            c.candidates.clone()
        }
        (_, Some(names)) => names,
        _ => {
            let max_id = max_candidate_id(&mut loaded.ballots)
                .context(ReadingBallotsSnafu { path: path.as_str() })?;
            info!("No candidate names: using {} numbered candidates", max_id);
            default_candidate_names(max_id)
        }
    };

    // The summary is keyed by candidate name.
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for name in candidates.iter() {
        ensure!(
            seen.insert(name.as_str()),
            DuplicateCandidateSnafu { name: name.as_str() }
        );
    }

    let ballots = normalize_source(args, loaded.ballots, spool_size)?;

    let mut contest = Contest::new(candidates, ballots);
    contest.name = Some(
        config
            .as_ref()
            .map(|c| c.contest_name.clone())
            .or(loaded.title)
            .unwrap_or_else(|| simplify_file_name(&path)),
    );
    contest.id = config.as_ref().and_then(|c| c.contest_id).unwrap_or(1);
    contest.seat_count = config
        .as_ref()
        .and_then(|c| c.seat_count)
        .or(loaded.seats)
        .unwrap_or(1);
    contest.notes = config
        .as_ref()
        .and_then(|c| c.notes.clone())
        .unwrap_or_default();
    debug!("contest: {:?}", contest);

    let result = count_irv_contest(&mut contest).context(TabulatingSnafu)?;
    log_results(&contest, &result);

    // Assemble the final json
    let result_js = build_summary_js(&contest, &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(FormattingJsonSnafu)?;
    write_summary(args.out.as_deref(), &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(FormattingJsonSnafu)?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary {:?}", summary_p);
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
        info!("The summary matches the reference {:?}", summary_p);
    }

    Ok(())
}
