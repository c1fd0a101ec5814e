//! `xlatefsd`: parses the command line, brings up logging and (unless
//! `--no-daemon`) daemonizes, then builds and runs the translator graph
//! described by a volume spec (§6).

use std::process::ExitCode;

use clap::Parser;
use xlatefs::bootstrap::cli::CliArgs;
use xlatefs::bootstrap::{daemon, logging, run};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if let Err(e) = logging::init_logging(args.effective_log_level().to_level_filter(), args.log_file.as_deref()) {
        eprintln!("xlatefsd: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(run_id) = &args.run_id {
        if let Some(log_file) = &args.log_file {
            let log_path = std::path::Path::new(log_file);
            if let Err(e) = daemon::rotate_log_for_run_id(log_path, run_id, std::time::SystemTime::now()) {
                log::warn!("log rotation for run-id '{run_id}' failed: {e}");
            }
        }
    }

    if !args.effective_no_daemon() {
        if let Err(e) = daemon::daemonize() {
            log::error!("daemonize failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    let _pid_guard = args.pid_file.as_ref().and_then(|path| match daemon::write_pid_file(std::path::Path::new(path)) {
        Ok(file) => Some((path.clone(), file)),
        Err(e) => {
            log::error!("failed to write pid file {path}: {e}");
            None
        }
    });

    let result = run(&args);
    if let Some((path, _file)) = &_pid_guard {
        daemon::remove_pid_file(std::path::Path::new(path));
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("xlatefsd exiting: {e}");
            ExitCode::FAILURE
        }
    }
}
