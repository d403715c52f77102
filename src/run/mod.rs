//! Agent run execution.
//!
//! A [`Run`] moves through [`RunState`]s as its event stream is consumed and
//! ends in exactly one of `Completed`, `Failed` or `Cancelled`.

mod engine;
mod request;
mod result;
mod state;

pub use engine::Run;
pub use request::{Attachment, RunRequest};
pub use result::{Invocation, InvocationKind, RunResult};
pub use state::RunState;
