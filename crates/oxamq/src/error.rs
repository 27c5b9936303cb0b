use oxamq_codec::CodecError;
use oxamq_engine::EngineError;
use oxamq_security::SecurityError;
use oxamq_transport::TransportError;
use thiserror::Error;

/// The rolled-up error type for the whole engine stack. Every layer's
/// error converts into it with `?`, so applications driving the stack
/// through the facade handle one type.
#[derive(Debug, Error)]
pub enum OxamqError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    /// A tracker referred to a delivery this registry never issued or
    /// has already settled away.
    #[error("unknown tracker {0}")]
    UnknownTracker(u64),

    /// A message buffer did not hold the expected section layout.
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),
}

// =========================================================================
// Tests
// =========================================================================
