//! CLI argument definitions

use clap::Parser;
use omapi_scope_common::{DEFAULT_SOCKET_PATH, ENV_SOCKET_PATH, MAX_RECORDS};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "omapi-scope",
    about = "Collect and display OMAPI secure-element calls from instrumented processes",
    after_help = "\
EXAMPLES:
    omapi-scope                                  Print records as they arrive
    omapi-scope --verbose                        Include thread, process and call stacks
    omapi-scope --duration 60 --export calls.json
    omapi-scope --headless --export calls.json   No per-record output, periodic stats"
)]
pub struct Args {
    /// Socket instrumented processes deliver records to
    #[arg(long, value_name = "PATH", env = ENV_SOCKET_PATH, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Export stored records as JSON on exit
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Don't print records, only periodic statistics (requires --export)
    #[arg(long, requires = "export")]
    pub headless: bool,

    /// Records kept in memory; the oldest are evicted first
    #[arg(long, default_value_t = MAX_RECORDS)]
    pub capacity: usize,

    /// Print thread, process and call stack for each record
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
