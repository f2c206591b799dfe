mod args;
mod rcv;

use clap::Parser;
use log::{debug, error, LevelFilter};
use snafu::ErrorCompat;

fn main() {
    let args = args::Args::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();
    debug!("args: {:?}", args);

    if let Err(e) = rcv::run_election(&args) {
        error!("{}", e);
        for cause in e.iter_chain().skip(1) {
            error!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
