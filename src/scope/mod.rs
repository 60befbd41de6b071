//! Namespace scoping for actions and reducers.

mod filter;

pub use filter::{is_from_namespace, wrap_reducer};
