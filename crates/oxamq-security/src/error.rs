use oxamq_codec::CodecError;
use thiserror::Error;

/// Everything the security layers can fail with.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The peer's eight bytes were not the SASL protocol header.
    #[error("protocol header mismatch: expected AMQP SASL header, found {found:?}")]
    HeaderMismatch { found: [u8; 8] },

    /// A SASL frame carried a descriptor outside 0x40..=0x44.
    #[error("unknown sasl performative descriptor {0:#x}")]
    UnknownPerformative(u64),

    /// A SASL frame decoded but its fields made no sense.
    #[error("malformed sasl performative: {0}")]
    MalformedPerformative(&'static str),

    /// A frame arrived that the negotiation state machine cannot accept
    /// (e.g. a Challenge before Init).
    #[error("sasl frame out of sequence: {0}")]
    OutOfSequence(&'static str),

    /// The requested feature exists in the API surface but has no
    /// implementation behind it. Callers feature-detect with this.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A fatal error already poisoned this layer.
    #[error("security layer is defunct")]
    Defunct,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
