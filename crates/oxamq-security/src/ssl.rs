//! The SSL layer boundary.
//!
//! This crate draws the API line for transport security without pulling
//! a TLS implementation behind it: an [`SslDomain`] carries the
//! configuration an engine embedder would hand to a real TLS stack
//! (mode, credentials, trust store, verification policy), and an
//! [`Ssl`] session exposes the negotiated parameters read-only.
//! Configuration that would require an actual handshake to honor is
//! rejected up front with [`SecurityError::Unsupported`], so callers
//! can feature-detect instead of failing mid-connection.

use crate::error::SecurityError;

/// Which end of the TLS handshake a domain configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Client,
    Server,
}

/// How hard a domain verifies the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Verify the peer certificate and the hostname it names.
    VerifyPeerName,
    /// Verify the peer certificate only.
    VerifyPeer,
    /// Accept any peer. Only valid for anonymous cipher setups.
    AnonymousPeer,
}

/// TLS configuration shared across the connections of one process.
#[derive(Debug, Clone)]
pub struct SslDomain {
    mode: SslMode,
    certificate: Option<String>,
    private_key: Option<String>,
    trusted_ca: Option<String>,
    verify: VerifyMode,
}

impl SslDomain {
    /// A domain for the given handshake end, verifying peer name by
    /// default (clients) or peer certificate (servers).
    pub fn new(mode: SslMode) -> Self {
        Self {
            mode,
            certificate: None,
            private_key: None,
            trusted_ca: None,
            verify: match mode {
                SslMode::Client => VerifyMode::VerifyPeerName,
                SslMode::Server => VerifyMode::VerifyPeer,
            },
        }
    }

    pub fn mode(&self) -> SslMode {
        self.mode
    }

    /// Sets the certificate and private key files presented to peers.
    pub fn set_credentials(
        &mut self,
        certificate: impl Into<String>,
        private_key: impl Into<String>,
    ) {
        self.certificate = Some(certificate.into());
        self.private_key = Some(private_key.into());
    }

    /// Sets the trusted CA database used to verify peers.
    pub fn set_trusted_ca(&mut self, path: impl Into<String>) {
        self.trusted_ca = Some(path.into());
    }

    /// Sets the peer verification policy.
    ///
    /// # Errors
    /// [`SecurityError::Unsupported`] for combinations this boundary
    /// cannot honor: verifying a peer with no trust store configured,
    /// or hostname verification on a server domain.
    pub fn set_verify_mode(&mut self, verify: VerifyMode) -> Result<(), SecurityError> {
        match verify {
            VerifyMode::VerifyPeerName if self.mode == SslMode::Server => {
                return Err(SecurityError::Unsupported(
                    "hostname verification on a server domain",
                ));
            }
            VerifyMode::VerifyPeerName | VerifyMode::VerifyPeer if self.trusted_ca.is_none() => {
                return Err(SecurityError::Unsupported(
                    "peer verification without a trusted CA database",
                ));
            }
            _ => {}
        }
        self.verify = verify;
        Ok(())
    }

    pub fn verify_mode(&self) -> VerifyMode {
        self.verify
    }
}

/// One connection's TLS session state, read-only once negotiated.
#[derive(Debug)]
pub struct Ssl {
    cipher: Option<String>,
    protocol: Option<String>,
}

impl Ssl {
    /// A session under `domain`. The handshake itself happens in
    /// whatever TLS stack the embedder wires underneath; this records
    /// its results.
    pub fn new(domain: &SslDomain) -> Self {
        let _ = domain;
        Self {
            cipher: None,
            protocol: None,
        }
    }

    /// The negotiated cipher suite name, once known.
    pub fn cipher_name(&self) -> Option<&str> {
        self.cipher.as_deref()
    }

    /// The negotiated protocol version name, once known.
    pub fn protocol_name(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Records the handshake results reported by the underlying stack.
    pub fn set_negotiated(
        &mut self,
        cipher: impl Into<String>,
        protocol: impl Into<String>,
    ) {
        self.cipher = Some(cipher.into());
        self.protocol = Some(protocol.into());
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_without_trust_store_is_unsupported() {
        let mut domain = SslDomain::new(SslMode::Client);
        let err = domain.set_verify_mode(VerifyMode::VerifyPeer).unwrap_err();
        assert!(matches!(err, SecurityError::Unsupported(_)));
        // The previous policy stands.
        assert_eq!(domain.verify_mode(), VerifyMode::VerifyPeerName);
    }

    #[test]
    fn test_verify_with_trust_store_is_accepted() {
        let mut domain = SslDomain::new(SslMode::Client);
        domain.set_trusted_ca("/etc/ssl/certs/ca.pem");
        domain.set_verify_mode(VerifyMode::VerifyPeer).unwrap();
        assert_eq!(domain.verify_mode(), VerifyMode::VerifyPeer);
    }

    #[test]
    fn test_server_domain_rejects_hostname_verification() {
        let mut domain = SslDomain::new(SslMode::Server);
        domain.set_trusted_ca("/etc/ssl/certs/ca.pem");
        assert!(domain.set_verify_mode(VerifyMode::VerifyPeerName).is_err());
    }

    #[test]
    fn test_session_reports_negotiated_parameters() {
        let domain = SslDomain::new(SslMode::Client);
        let mut ssl = Ssl::new(&domain);
        assert_eq!(ssl.cipher_name(), None);
        ssl.set_negotiated("TLS_AES_128_GCM_SHA256", "TLSv1.3");
        assert_eq!(ssl.cipher_name(), Some("TLS_AES_128_GCM_SHA256"));
        assert_eq!(ssl.protocol_name(), Some("TLSv1.3"));
    }
}
