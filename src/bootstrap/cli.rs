//! Command-line surface (§6, §10.3), implemented with `clap`'s derive API —
//! an idiomatic, corpus-supported choice (the fuser-family crates in this
//! pack use `clap` for their example binaries).

use clap::Parser;

use crate::context::OptionOverride;
use crate::graph::parse_option_override;

/// The six-level log verbosity vocabulary from §6/§10.1, distinct from
/// `log::LevelFilter` (which has no `NORMAL`/`CRITICAL` distinction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevelArg {
    Trace,
    Debug,
    Warning,
    Normal,
    Error,
    Critical,
    None,
}

impl LogLevelArg {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Trace => log::LevelFilter::Trace,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Warning => log::LevelFilter::Warn,
            LogLevelArg::Normal => log::LevelFilter::Info,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Critical | LogLevelArg::None => log::LevelFilter::Off,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "xlatefsd", about = "Clustered filesystem client/server")]
pub struct CliArgs {
    /// Overrides the spec file source with a remote spec server host.
    #[arg(long)]
    pub specfile_server: Option<String>,

    /// Path to the local volume spec file.
    #[arg(long, default_value = "/etc/xlatefs/xlatefs.vol")]
    pub volume_specfile: String,

    #[arg(long, value_enum, default_value_t = LogLevelArg::Normal)]
    pub log_level: LogLevelArg,

    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long, default_value_t = 24007)]
    pub specfile_server_port: u16,

    #[arg(long, default_value = "tcp")]
    pub specfile_server_transport: String,

    #[arg(long)]
    pub pid_file: Option<String>,

    #[arg(long)]
    pub no_daemon: bool,

    #[arg(long)]
    pub run_id: Option<String>,

    /// Implies --no-daemon, --log-level=debug, and console logging (§10.5,
    /// `glusterfs.c`).
    #[arg(long)]
    pub debug: bool,

    #[arg(long)]
    pub volume_name: Option<String>,

    /// `VOL.KEY=VALUE`, repeatable.
    #[arg(long = "xlator-option")]
    pub xlator_options: Vec<String>,

    #[arg(long)]
    pub disable_direct_io_mode: bool,

    #[arg(long, default_value_t = 1.0)]
    pub directory_entry_timeout: f64,

    #[arg(long, default_value_t = 1.0)]
    pub attribute_timeout: f64,

    #[arg(long)]
    pub nodev: bool,

    #[arg(long)]
    pub nosuid: bool,

    /// The FUSE mount point. Optional: with no mountpoint the graph is still
    /// built and initialized (e.g. for a pure spec-fetch dry run).
    pub mountpoint: Option<String>,
}

impl CliArgs {
    /// Resolves the effective log level, honoring `--debug`'s override
    /// (§10.5).
    pub fn effective_log_level(&self) -> LogLevelArg {
        if self.debug {
            LogLevelArg::Debug
        } else {
            self.log_level
        }
    }

    pub fn effective_no_daemon(&self) -> bool {
        self.no_daemon || self.debug
    }

    /// Parses every `--xlator-option` into a `(volume, key, value)` triple,
    /// validated but not yet applied (the graph loader applies them after
    /// parsing the spec text, per §4.3).
    pub fn parsed_xlator_options(&self) -> Result<Vec<OptionOverride>, String> {
        self.xlator_options
            .iter()
            .map(|s| parse_option_override(s).ok_or_else(|| format!("malformed --xlator-option '{s}', expected VOL.KEY=VALUE")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_implies_no_daemon_and_debug_level() {
        let args = CliArgs::try_parse_from(["xlatefsd", "--debug"]).unwrap();
        assert!(args.effective_no_daemon());
        assert_eq!(args.effective_log_level(), LogLevelArg::Debug);
    }

    #[test]
    fn xlator_option_parses_into_triples() {
        let args = CliArgs::try_parse_from(["xlatefsd", "--xlator-option", "leaf.directory=/tmp/x"]).unwrap();
        let parsed = args.parsed_xlator_options().unwrap();
        assert_eq!(parsed[0].volume, "leaf");
        assert_eq!(parsed[0].key, "directory");
        assert_eq!(parsed[0].value, "/tmp/x");
    }

    #[test]
    fn malformed_xlator_option_is_rejected() {
        let args = CliArgs::try_parse_from(["xlatefsd", "--xlator-option", "not-a-triple"]).unwrap();
        assert!(args.parsed_xlator_options().is_err());
    }
}
