//! Terminus: the source/target descriptor attached to each end of a link.
//!
//! A terminus names an address and the delivery-semantics policy for one
//! end of a link. Every link carries four of them: the local source and
//! target the application configures, and the remote pair mirrored from
//! the peer's Attach frame. All four exist from link creation with
//! defaulted fields; there is no lazy construction to mutate state on a
//! read path.

use oxamq_codec::Value;

/// How long a terminus's state survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Nothing survives; the default.
    #[default]
    None,
    /// Configuration survives, delivery state does not.
    Configuration,
    /// Configuration and unsettled delivery state survive.
    UnsettledState,
}

impl Durability {
    /// The wire value carried in Attach.
    pub fn code(self) -> u32 {
        match self {
            Durability::None => 0,
            Durability::Configuration => 1,
            Durability::UnsettledState => 2,
        }
    }

    /// Parses a wire value, defaulting out-of-range codes to `None`.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Durability::Configuration,
            2 => Durability::UnsettledState,
            _ => Durability::None,
        }
    }
}

/// When a dynamic or shared terminus expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Expires when the link detaches.
    LinkDetach,
    /// Expires when the session ends; the default.
    #[default]
    SessionEnd,
    /// Expires when the connection closes.
    ConnectionClose,
    /// Never expires.
    Never,
}

impl ExpiryPolicy {
    /// The wire symbol carried in Attach.
    pub fn symbol(self) -> &'static str {
        match self {
            ExpiryPolicy::LinkDetach => "link-detach",
            ExpiryPolicy::SessionEnd => "session-end",
            ExpiryPolicy::ConnectionClose => "connection-close",
            ExpiryPolicy::Never => "never",
        }
    }

    /// Parses a wire symbol, defaulting unknown text to `SessionEnd`.
    pub fn from_symbol(s: &str) -> Self {
        match s {
            "link-detach" => ExpiryPolicy::LinkDetach,
            "connection-close" => ExpiryPolicy::ConnectionClose,
            "never" => ExpiryPolicy::Never,
            _ => ExpiryPolicy::SessionEnd,
        }
    }
}

/// One end of a link: address plus delivery-semantics policy.
///
/// The composite fields (`properties`, `filter`, `outcomes`,
/// `capabilities`) are raw codec values so applications can carry
/// whatever extension data the peer expects; `Value::Null` means absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Terminus {
    /// The address this terminus names, if any.
    pub address: Option<String>,
    /// What survives a disruption.
    pub durability: Durability,
    /// When a dynamic node expires.
    pub expiry_policy: ExpiryPolicy,
    /// Expiry timeout in seconds.
    pub timeout: u32,
    /// Whether the peer should create the node on attach.
    pub dynamic: bool,
    /// Node properties (a map, by convention).
    pub properties: Value,
    /// Source filter set (a map, by convention).
    pub filter: Value,
    /// Supported outcome symbols (a list or array, by convention).
    pub outcomes: Value,
    /// Extension capabilities (a list or array, by convention).
    pub capabilities: Value,
}

impl Terminus {
    /// A terminus with everything defaulted and the given address.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
