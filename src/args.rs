use clap::Parser;

/// This is an instant-runoff tabulation program.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the contest: its name, its candidates and
    /// where to find the ballots. Read the manual of the irv_counting crate for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference file containing the outcome of a contest in JSON format. If provided,
    /// rcvcount will check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the contest will be written in
    /// JSON format to the given location. It is printed to the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) The file with the ballots. Setting this option overrides the ballot
    /// source that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (internal or blt) The format of the input. By default, files ending with .blt are read
    /// as BLT and all the other files in the internal format.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// If passed as an argument, the ballots are sorted and merged before counting.
    #[clap(long, takes_value = false)]
    pub normalize: bool,

    /// (file path) If specified, the normalized ballots are written to this file in the internal
    /// format, and counted from there. Implies --normalize.
    #[clap(long, value_parser)]
    pub normalized_out: Option<String>,

    /// (bytes, default 1MiB) The size above which temporary ballot stores are moved to disk.
    #[clap(long, value_parser)]
    pub spool_size: Option<usize>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
