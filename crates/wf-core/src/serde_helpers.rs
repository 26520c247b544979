//! Small serde default helpers shared across the crate.

/// Default for boolean fields that should be `true` when omitted.
pub(crate) fn default_true() -> bool {
    true
}
