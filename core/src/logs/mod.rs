//! Durable per-process output log store.
//!
//! Every process gets one append-only file at
//! `<logs_dir>/<pid % max_dirs>/pid-<pid>` holding newline-delimited JSON
//! [`LogMessage`] records in chronological order.

mod distributor;
mod message;
mod reader;
mod writer;

pub use distributor::LogsDistributor;
pub use message::LogKind;
pub use message::LogMessage;
pub use message::parse_time;
pub use reader::read_logs;
pub use writer::FileLogger;
