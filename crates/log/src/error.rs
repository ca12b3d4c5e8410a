//! Logger setup errors.

use thiserror::Error;

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// The level directive could not be parsed.
    #[error("invalid log filter '{directive}': {reason}")]
    Filter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}
