//! Epic supervision: asynchronous side-effect handlers mounted and cancelled
//! at runtime.
//!
//! An epic is a handler run on its own thread against filtered views of the
//! store's action and state-snapshot streams. Its output is namespace-tagged
//! and merged into a single fan-in channel that feeds `dispatch`. A
//! `STOP_EPICS` action naming a registration's id cancels it; the token is
//! checked as the last stage of the output pipeline, after tagging.

mod supervisor;
mod types;

pub use supervisor::EpicSupervisor;
pub use types::{
    EpicContext, EpicFn, EpicOutput, EpicStatus, NamespacedStateStream, StateStream,
};
