//! word-splitter-producer: directory-to-topics publisher
//!
//! Watches one directory. Every file created in (or moved into) it is split
//! into words; each word of at most `limits.max_word_length` characters is
//! published to the topic named after its length, then the file is deleted.
//!
//! ## Configuration
//! - `word-splitter.yaml`, `--config <file>` or WORD_SPLITTER_CONFIG
//! - WORD_SPLITTER__MESSAGING__BOOTSTRAP_SERVERS etc. override file values
//! - WORD_SPLITTER_LOG: log filter (default: info)

use std::process::ExitCode;

use clap::Parser;

use word_splitter::bus::connect_publisher;
use word_splitter::config::{validate_watch_dir, Config};
use word_splitter::process::{
    exit_for_error, exit_for_invalid_argument, exit_for_parse_error, run_producer, ProducerArgs,
    ProcessError, PRODUCER_USAGE,
};
use word_splitter::utils::bootstrap::init_tracing;
use word_splitter::utils::signal::shutdown_signal;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match ProducerArgs::try_parse() {
        Ok(args) => args,
        Err(e) => return exit_for_parse_error(e, PRODUCER_USAGE),
    };

    if let Err(e) = validate_watch_dir(&args.watch_dir) {
        return exit_for_invalid_argument(&e, PRODUCER_USAGE);
    }

    init_tracing();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return exit_for_error(&ProcessError::from(e)),
    };

    let bus = match connect_publisher(&config.messaging).await {
        Ok(bus) => bus,
        Err(e) => return exit_for_error(&ProcessError::from(e)),
    };

    match run_producer(&args.watch_dir, &config, bus, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit_for_error(&e),
    }
}
