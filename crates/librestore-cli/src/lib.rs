use std::path::PathBuf;

use clap::Parser;

mod restore;

pub use restore::Restore;

pub const DEFAULT_LOG_FILE: &str = "/var/log/dockrestore.log";

#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// change log level to debug, but the `log-level` flag takes precedence
    #[clap(long)]
    pub debug: bool,
    /// set the log file to write dockrestore logs to, alongside stdout
    #[clap(short, long, default_value = DEFAULT_LOG_FILE)]
    pub log: PathBuf,
    /// set the log format ("text" (default), or "json")
    #[clap(long)]
    pub log_format: Option<String>,
    /// set the log level (default is 'info')
    #[clap(long)]
    pub log_level: Option<String>,
}
