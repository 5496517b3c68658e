//! Thread supervision and event dispatch core of the keg controller.
//!
//! Every long-running concern of the controller runs on its own
//! [`SupervisedThread`](thread::SupervisedThread). A watchdog turns the
//! unexpected death of any of them into a single shutdown event, which
//! the hub fans out so the whole process stops together.

pub mod config;
pub mod error;
pub mod event;
pub mod external;
pub mod hub;
pub mod io;
pub mod runtime;
mod test;
pub mod thread;
pub mod utils;
pub mod workers;

pub mod prelude;
