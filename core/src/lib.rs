//! Process supervision for the exec agent.
//!
//! [`ProcessRegistry`] spawns shell commands, captures their output into a
//! durable per-process log and fans lifecycle and output events out to
//! subscribers. A [`Cleaner`] evicts records that have been dead for too long.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through tracing.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod builder;
mod cleaner;
mod command;
mod config;
mod error;
mod event;
pub mod logs;
mod process;
mod pumper;
mod registry;
mod subscriber;

pub use builder::ProcessBuilder;
pub use cleaner::Cleaner;
pub use command::Command;
pub use config::DEFAULT_LOG_FLUSH_THRESHOLD;
pub use config::DEFAULT_MAX_DIRS_COUNT;
pub use config::DEFAULT_SHELL;
pub use config::ProcessConfig;
pub use error::ProcessError;
pub use error::Result;
pub use event::Event;
pub use event::EventMask;
pub use event::STATUS_EVENT_TYPE;
pub use event::STDERR_EVENT_TYPE;
pub use event::STDOUT_EVENT_TYPE;
pub use logs::LogKind;
pub use logs::LogMessage;
pub use process::MachineProcess;
pub use process::UNSET_EXIT_CODE;
pub use pumper::LineConsumer;
pub use pumper::OutputPumper;
pub use registry::ProcessRegistry;
pub use subscriber::DeliveryError;
pub use subscriber::EventConsumer;
pub use subscriber::Subscriber;
