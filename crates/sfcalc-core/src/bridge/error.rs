use crate::core::databank::DatabankError;
use crate::engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error(
        "geometry update changed the structure topology ({detail}); the session expected \
         {expected} atoms and got {actual} -- construct a new session instead"
    )]
    TopologyMismatch {
        expected: usize,
        actual: usize,
        detail: String,
    },

    #[error("weight vector has {actual} entries but {expected} reflection indices are active")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("no scattering factors for element '{symbol}' in table {table}")]
    UnknownElement { symbol: String, table: String },

    #[error(transparent)]
    Databank(#[from] DatabankError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl BridgeError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        BridgeError::Configuration {
            reason: reason.into(),
        }
    }
}
