//! SSH certificate authority for Drone CI build agents.
//!
//! A build agent presents two signed assertions (JWTs issued by Drone), one
//! describing the build and one describing the repository, together with
//! the SSH public key it wants certified. This crate verifies both
//! assertions, derives the principals the agent may log in as, and signs a
//! short-lived OpenSSH user certificate for the submitted key.
//!
//! # Components
//!
//! - [`trust`] - Process-wide trust material (verification key + CA key)
//! - [`signing_key`] - CA private key loading from OpenSSH or PEM text
//! - [`assertion`] - JWT verification with an algorithm fixed at startup
//! - [`claims`] - Typed build and repository claims
//! - [`subject`] - Parsing of the client's OpenSSH public key
//! - [`scope`] - Claims to key id and principal list
//! - [`minter`] - Serial generation, validity window and signing
//! - [`issuer`] - Per-request orchestration of the above
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use drone_ca::{IssuanceRequest, Issuer, TrustKey};
//!
//! # fn example(public_pem: &str, ca_key: &str, req: IssuanceRequest) -> drone_ca::Result<()> {
//! let trust = Arc::new(TrustKey::load(public_pem, ca_key)?);
//! let issuer = Issuer::new(trust);
//!
//! let issued = issuer.issue(&req)?;
//! println!("{}", issued.encoded);
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod claims;
pub mod issuer;
pub mod minter;
pub mod scope;
pub mod signing_key;
pub mod subject;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod trust;

pub use assertion::{AssertionKind, AssertionVerifier, VerificationKey};
pub use claims::{BuildClaims, RegisteredClaims, RepoClaims};
pub use issuer::{IssuanceRequest, IssuedCertificate, Issuer};
pub use minter::{
    CertificateMinter, EntropySource, OsEntropy, ValidityWindow, CERT_LIFETIME, CLOCK_SKEW,
};
pub use scope::{derive_scope, Scope};
pub use signing_key::parse_signing_key;
pub use subject::parse_subject_key;
pub use trust::TrustKey;

/// Errors that can occur while verifying a request or issuing a certificate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The assertion verification key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The assertion verification key is of a type we cannot verify with.
    #[error("unsupported public key type: {0}")]
    UnsupportedKeyType(String),

    /// The CA signing key could not be loaded.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// An assertion failed signature, encoding or time validation.
    #[error("{kind} assertion rejected: {reason}")]
    Assertion { kind: AssertionKind, reason: String },

    /// The submitted SSH public key could not be parsed.
    #[error("invalid subject key: {reason}")]
    SubjectKey {
        /// Raw submitted text, kept for diagnostics only.
        raw: String,
        reason: String,
    },

    /// The secure random source failed.
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// The system clock is unusable (before the Unix epoch).
    #[error("clock error: {0}")]
    Clock(String),

    /// Building or signing the certificate failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// Serializing the signed certificate failed.
    #[error("certificate encoding failed: {0}")]
    Encoding(String),
}

impl Error {
    /// Returns true if the error was caused by the caller's input.
    ///
    /// Client errors map to HTTP 400. Everything raised at request time that
    /// is not a client error is an internal fault and maps to HTTP 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Assertion { .. } | Error::SubjectKey { .. })
    }
}

/// Result type for drone-ca operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let err = Error::Assertion {
            kind: AssertionKind::Build,
            reason: "InvalidSignature".into(),
        };
        assert!(err.is_client_error());

        let err = Error::SubjectKey {
            raw: "ssh-ed25519 AAAA".into(),
            reason: "truncated".into(),
        };
        assert!(err.is_client_error());

        assert!(!Error::Entropy("pool closed".into()).is_client_error());
        assert!(!Error::Signing("key mismatch".into()).is_client_error());
        assert!(!Error::Clock("before epoch".into()).is_client_error());
        assert!(!Error::Encoding("bad base64".into()).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Assertion {
            kind: AssertionKind::Repo,
            reason: "ExpiredSignature".into(),
        };
        assert_eq!(err.to_string(), "repo assertion rejected: ExpiredSignature");

        let err = Error::SubjectKey {
            raw: "garbage".into(),
            reason: "unknown algorithm".into(),
        };
        // The raw key is never part of the message.
        assert_eq!(err.to_string(), "invalid subject key: unknown algorithm");
    }
}
