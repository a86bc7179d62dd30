//! `tracing` macros used across the crate.
//!
//! Events go to the `tablestore` target, so a host engine can raise or mute
//! storage logging independently of its own. Nothing here installs a
//! subscriber.
//!
//! Each event names the layer that emitted it in `component`:
//!
//! | component | emitted for |
//! |-----------|-------------|
//! | `store`   | store opens, sharing, closes, temporary map cleanup |
//! | `index`   | bulk build spills and merges |
//! | `table`   | row undo failures, promotion, freezing, auto-analyze |
//! | `schema`  | object creation, rename, removal, commit eviction |
//!
//! and a snake_case `event` naming what happened. Paths and names are
//! recorded with `%`, modes and enums with `?`.

/// The target every macro below logs under.
pub(crate) const TABLESTORE_TARGET: &str = "tablestore";

/// `tracing::info!` under [`TABLESTORE_TARGET`].
///
/// ```ignore
/// log_info!(
///     component = "schema",
///     event = "table_created",
///     schema = %self.name,
///     table = %name,
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::TABLESTORE_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::TABLESTORE_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::TABLESTORE_TARGET, $($field)*)
    };
}

macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::TABLESTORE_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
