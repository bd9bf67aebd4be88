//! Process-wide trust material.
//!
//! Loaded once at startup and never mutated afterwards, so it is shared
//! between requests as a plain `Arc<TrustKey>` without locking.

use std::fmt;

use ssh_key::{HashAlg, PrivateKey, PublicKey};
use tracing::info;

use crate::assertion::{AssertionVerifier, VerificationKey};
use crate::signing_key::parse_signing_key;
use crate::{Error, Result};

/// The assertion verification key and the CA signing key.
pub struct TrustKey {
    verifier: AssertionVerifier,
    signing_key: PrivateKey,
}

impl TrustKey {
    /// Creates trust material from already parsed keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSigningKey`] if the CA key is still encrypted.
    pub fn new(verification_key: &VerificationKey, signing_key: PrivateKey) -> Result<Self> {
        if signing_key.is_encrypted() {
            return Err(Error::InvalidSigningKey(
                "encrypted private keys are not supported".to_string(),
            ));
        }

        let verifier = AssertionVerifier::new(verification_key)?;

        info!(
            assertion_algorithm = ?verifier.algorithm(),
            ca_algorithm = %signing_key.algorithm(),
            ca_fingerprint = %signing_key.public_key().fingerprint(HashAlg::Sha256),
            "loaded trust material"
        );

        Ok(Self {
            verifier,
            signing_key,
        })
    }

    /// Creates trust material from a PEM `PUBLIC KEY` block and the CA
    /// private key text, as found in the service configuration.
    ///
    /// The private key may be OpenSSH, PKCS#1, PKCS#8 or SEC1 encoded. See
    /// [`parse_signing_key`].
    pub fn load(public_pem: &str, private_key: &str) -> Result<Self> {
        let verification_key = VerificationKey::from_pem(public_pem)?;
        let signing_key = parse_signing_key(private_key)?;
        Self::new(&verification_key, signing_key)
    }

    /// Verifier for inbound assertions.
    pub fn verifier(&self) -> &AssertionVerifier {
        &self.verifier
    }

    /// CA key used to sign certificates.
    pub fn signing_key(&self) -> &PrivateKey {
        &self.signing_key
    }

    /// Public half of the CA key, as hosts put it in `TrustedUserCAKeys`.
    pub fn ca_public_key(&self) -> &PublicKey {
        self.signing_key.public_key()
    }
}

impl fmt::Debug for TrustKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustKey")
            .field("verifier", &self.verifier)
            .field(
                "ca_fingerprint",
                &self
                    .ca_public_key()
                    .fingerprint(HashAlg::Sha256)
                    .to_string(),
            )
            .finish()
    }
}
