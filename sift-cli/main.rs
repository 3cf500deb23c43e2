use log::LevelFilter;
use sift_cli::{BatchDriver, Config};
use std::process::ExitCode;

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let config = match Config::try_parse_from(std::env::args_os()) {
        Ok(Ok(config)) => config,
        Ok(Err(e)) => {
            eprintln!("sift: error: {}", e);
            return ExitCode::from(1);
        }
        Err(e) => {
            // help and version go to stdout and are not failures
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };

    pretty_env_logger::formatted_builder()
        .filter_level(level_for(config.verbosity))
        .parse_default_env()
        .init();
    config.log_summary();

    let report = BatchDriver::new(config).run();
    ExitCode::from(report.exit_code())
}
