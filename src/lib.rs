//! word-splitter - length-routed word pipeline
//!
//! A producer watches a directory, splits every new file into words and
//! publishes each word to a topic named after its length. A consumer drains
//! one topic into an append-only output file.
//!
//! ## Architecture
//! ```text
//! [directory] -> [DirectoryWatcher] -> [FilePublisher] -> [MessageBus]
//!                                                              |
//!                                                              v
//!                               [output file] <- [MessageConsumer]
//! ```

pub mod bus;
pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod process;
pub mod publisher;
pub mod tokenize;
pub mod utils;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_utils;
