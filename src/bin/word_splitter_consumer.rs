//! word-splitter-consumer: topic-to-file consumer
//!
//! Subscribes to one topic under the consumer group
//! `<consumer_group_prefix>-<topic>` and appends each message, one per line,
//! to the output file. Offsets are committed after each write.
//!
//! ## Configuration
//! - `word-splitter.yaml`, `--config <file>` or WORD_SPLITTER_CONFIG
//! - WORD_SPLITTER__MESSAGING__CONSUMER_GROUP_PREFIX etc. override file values
//! - WORD_SPLITTER_LOG: log filter (default: info)

use std::process::ExitCode;

use clap::Parser;

use word_splitter::config::{validate_consumer_target, Config};
use word_splitter::consumer::MessageConsumer;
use word_splitter::process::{
    exit_for_error, exit_for_invalid_argument, exit_for_parse_error, run_consumer, ConsumerArgs,
    ProcessError, CONSUMER_USAGE,
};
use word_splitter::utils::bootstrap::init_tracing;
use word_splitter::utils::signal::shutdown_signal;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match ConsumerArgs::try_parse() {
        Ok(args) => args,
        Err(e) => return exit_for_parse_error(e, CONSUMER_USAGE),
    };

    if let Err(e) = validate_consumer_target(&args.topic, &args.output) {
        return exit_for_invalid_argument(&e, CONSUMER_USAGE);
    }

    init_tracing();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return exit_for_error(&ProcessError::from(e)),
    };

    let consumer = match MessageConsumer::connect(&config, &args.topic, &args.output).await {
        Ok(consumer) => consumer,
        Err(e) => return exit_for_error(&ProcessError::from(e)),
    };

    match run_consumer(consumer, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit_for_error(&e),
    }
}
