//! Contracts of the collaborators the core drives but does not implement.

pub use alarm::*;
pub use flow::*;
pub use protocol::*;

mod alarm;
mod flow;
mod protocol;
