use serde::Serialize;
use tracing::{Level, debug};

/// Dump `value` as indented JSON at debug level.
///
/// Serialization is skipped entirely unless debug logging is enabled.
pub(crate) fn debug_json<T>(label: &str, value: &T)
where
    T: Serialize + ?Sized,
{
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }

    match serde_json::to_string_pretty(value) {
        Ok(json) => debug!("{label}:\n{json}"),
        Err(error) => debug!(%error, "{label}: serialization failed"),
    }
}
