use std::path::Path;

use irv_counting::streams::{StreamResource, StreamResult};
use irv_counting::Ballot;
use log::debug;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// A path given in a configuration file is relative to the directory of
/// that file.
pub fn resolve_path(root: &Path, file_path: &str) -> String {
    root.join(file_path).display().to_string()
}

/// Default names when the ballots come without a list of candidates.
pub fn default_candidate_names(count: u32) -> Vec<String> {
    (1..=count).map(|i| format!("Candidate {}", i)).collect()
}

/// Scans the ballots once and returns the highest candidate number in them.
pub fn max_candidate_id<R>(ballots: &mut R) -> StreamResult<u32>
where
    R: StreamResource<Item = Ballot>,
{
    let mut max_id = 0;
    for ballot in ballots.reading()? {
        let ballot = ballot?;
        if let Some(m) = ballot.choices.iter().map(|c| c.0).max() {
            max_id = max_id.max(m);
        }
    }
    debug!("max_candidate_id: {} in {}", max_id, ballots.describe());
    Ok(max_id)
}
