//! Process entry point: parse CLI args into config overrides, start logging,
//! and hand off to the server. Exit codes: 0 on a clean shutdown, 1 on a
//! config error, 2 if startup fails to load persisted state.
use flexi_logger::{FileSpec, Logger};
use keyspaced::{config::Config, error::Error, server};
use std::{path::PathBuf, process::ExitCode};

/// `keyspaced [config-file] [--key value]...`, mirroring the config file's
/// own `key value` shape for overrides so the two stay easy to cross-reference.
fn parse_args() -> (Option<PathBuf>, Vec<(String, String)>) {
    let mut args = std::env::args().skip(1).peekable();
    let mut config_path = None;
    let mut overrides = Vec::new();

    if let Some(first) = args.peek() {
        if !first.starts_with("--") {
            config_path = Some(PathBuf::from(args.next().unwrap()));
        }
    }

    while let Some(flag) = args.next() {
        let key = flag.trim_start_matches("--").to_owned();
        match args.next() {
            Some(value) => overrides.push((key, value)),
            None => eprintln!("warning: ignoring trailing flag '--{}' with no value", key),
        }
    }

    (config_path, overrides)
}

fn init_logging(config: &Config) -> Result<(), Error> {
    let level: log::LevelFilter = config.log.level.into();
    let mut logger = Logger::try_with_str(level.to_string()).map_err(|e| Error::Config(e.to_string()))?;
    if !config.log.file.is_empty() {
        logger = logger
            .log_to_file(FileSpec::try_from(&config.log.file).map_err(|e| Error::Config(e.to_string()))?)
            .duplicate_to_stderr(flexi_logger::Duplicate::Warn);
    }
    logger.start().map_err(|e| Error::Config(e.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let (config_path, overrides) = parse_args();

    let config = match Config::load(config_path.as_ref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("logging setup failed: {}", e);
        return ExitCode::from(1);
    }

    log::info!("keyspaced starting on {}:{}", config.host, config.port);

    if let Err(e) = server::serve(config).await {
        match &e {
            Error::Io(_) | Error::Config(_) => {
                log::error!("failed to load persisted state: {}", e);
                return ExitCode::from(2);
            }
            other => {
                log::error!("server exited with an error: {}", other);
                return ExitCode::from(1);
            }
        }
    }

    ExitCode::SUCCESS
}
