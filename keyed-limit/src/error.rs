/// Errors produced when building a limiter.
///
/// Runtime operations never fail; only configuration is validated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// A configuration value would make the limiter meaningless.
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfiguration {
        /// The offending configuration field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl LimiterError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidConfiguration { field, reason }
    }
}
