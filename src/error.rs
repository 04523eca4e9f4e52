//! Engine error kinds.
//!
//! Arena exhaustion is deliberately absent: it is recovered locally inside a
//! search step (the step finishes, a warning is flagged in the performance
//! report, further steps are skipped). Budget exhaustion is an ordinary exit
//! condition, not an error.

use thiserror::Error;

/// Errors surfaced by the engines and the game runner.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A move name that parses to no action or to an illegal action for the
    /// current position. Raised by the game runner; the search core never
    /// consumes illegal actions.
    #[error("illegal move '{name}' for the current position")]
    IllegalMove { name: String },

    /// A game-mechanics contract breach (e.g. an enumerated action failing
    /// the legality test). Always a bug; aborts the search.
    #[error("game mechanics contract violated: {0}")]
    ContractViolation(String),

    /// I/O failure (experiment archive, human input).
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Experiment archive that does not parse or misses required keys.
    #[error("malformed experiment archive: {0}")]
    ArchiveFormat(#[from] serde_json::Error),
}
