//! Error types for the transport layer.

use thiserror::Error;

use oxamq_codec::CodecError;
use oxamq_engine::EngineError;

/// Everything that can go wrong driving frames.
///
/// The fatal/recoverable split follows the protocol's rules: a
/// malformed frame or header poisons the whole transport (callers must
/// tear it down and start over), while [`Overflow`](Self::Overflow) is
/// an invitation to retry `output` with a larger budget.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `bind` on a transport that already has a connection.
    #[error("transport is already bound to a connection")]
    AlreadyBound,

    /// `input`/`output` on a transport with no bound connection.
    #[error("transport is not bound to a connection")]
    NotBound,

    /// The next pending frame is larger than the byte budget handed to
    /// `output`. Recoverable: retry with a larger budget.
    #[error("frame of {frame} bytes exceeds output budget of {budget}")]
    Overflow {
        /// Size of the frame that did not fit.
        frame: usize,
        /// The budget it was offered.
        budget: usize,
    },

    /// The peer's protocol header is not AMQP 1.0. Fatal.
    #[error("protocol header mismatch: {found:02x?}")]
    HeaderMismatch {
        /// The eight bytes the peer actually sent.
        found: [u8; 8],
    },

    /// A frame header declared a size smaller than the header itself.
    /// Fatal.
    #[error("frame size {0} below minimum of 8")]
    FrameTooSmall(u32),

    /// A frame exceeded the negotiated maximum frame size. Fatal.
    #[error("frame of {size} bytes exceeds max frame size {max}")]
    FrameTooLarge {
        /// Declared frame size.
        size: u32,
        /// The configured limit.
        max: u32,
    },

    /// A frame's data offset points outside the frame. Fatal.
    #[error("invalid data offset {0}")]
    InvalidDoff(u8),

    /// A frame of a type this transport does not speak. Fatal.
    #[error("unexpected frame type {0:#04x}")]
    UnexpectedFrameType(u8),

    /// A performative with a descriptor the protocol does not define.
    /// Fatal.
    #[error("unknown performative descriptor {0:#x}")]
    UnknownPerformative(u64),

    /// A performative whose body is not the described list the protocol
    /// requires, or with a field of the wrong type. Fatal.
    #[error("malformed performative: {0}")]
    MalformedPerformative(&'static str),

    /// A frame referenced a channel no session occupies. Fatal.
    #[error("unknown channel {0}")]
    UnknownChannel(u16),

    /// A frame referenced a link handle never attached. Fatal.
    #[error("unknown link handle {0}")]
    UnknownHandle(u32),

    /// A previous fatal error already poisoned this transport; it must
    /// be discarded and rebuilt.
    #[error("transport is defunct after a fatal error")]
    Defunct,

    /// The frame body failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A decoded frame drove the engine into an illegal transition.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl TransportError {
    /// Whether this error poisons the transport (everything except the
    /// retryable capacity and misuse cases).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TransportError::Overflow { .. }
                | TransportError::AlreadyBound
                | TransportError::NotBound
        )
    }
}
