//! Verification of signed build and repository assertions.
//!
//! Drone signs both assertions with the same key pair. The public half is
//! configured once as a PEM `PUBLIC KEY` block. Its key type decides the
//! only JWT algorithm we accept, and that decision is made at startup:
//!
//! | SPKI algorithm          | JWT algorithm |
//! |-------------------------|---------------|
//! | Ed25519                 | `EdDSA`       |
//! | RSA                     | `RS256`       |
//! | EC public key, P-256    | `ES256`       |
//!
//! Any other key type is an [`Error::UnsupportedKeyType`] and the service
//! refuses to start.
//!
//! # Security
//!
//! - The token header cannot select the algorithm. A token signed with a
//!   different algorithm than the one bound to the key is rejected.
//! - `exp` and `nbf` are enforced when present, with [`ASSERTION_LEEWAY_SECS`]
//!   of tolerance.
//! - A failed verification never yields partial claims.

use std::fmt;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use pkcs8::der::Decode;
use pkcs8::spki::{ObjectIdentifier, SubjectPublicKeyInfoRef};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{Error, Result};

pub(crate) const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
pub(crate) const RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub(crate) const ID_EC_PUBLIC_KEY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
pub(crate) const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// PEM label required on the verification key.
pub const PUBLIC_KEY_PEM_LABEL: &str = "PUBLIC KEY";

/// Clock tolerance applied to `exp` and `nbf`, in seconds.
pub const ASSERTION_LEEWAY_SECS: u64 = 30;

/// Which of the two assertions a token is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssertionKind {
    /// The assertion describing the running build.
    Build,
    /// The assertion describing the source repository.
    Repo,
}

impl AssertionKind {
    /// The form field name carrying this assertion.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionKind::Build => "build",
            AssertionKind::Repo => "repo",
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed verification key, classified by its SPKI algorithm.
///
/// Each variant keeps the PEM text so the JWT decoding key can be built
/// from it without re-encoding.
#[derive(Clone, Debug)]
pub enum VerificationKey {
    /// Edwards-curve key, verified with `EdDSA`.
    Ed25519 { pem: String },
    /// RSA key, verified with `RS256`.
    Rsa { pem: String },
    /// NIST P-256 key, verified with `ES256`.
    EcdsaP256 { pem: String },
}

impl VerificationKey {
    /// Parses a PEM `PUBLIC KEY` block and classifies the key it contains.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPublicKey`] if the text is not PEM, carries another
    ///   label, or is not a valid SubjectPublicKeyInfo.
    /// - [`Error::UnsupportedKeyType`] for any algorithm outside the three
    ///   supported families, including EC keys on curves other than P-256.
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        let parsed = pem::parse(pem_text.trim())
            .map_err(|e| Error::InvalidPublicKey(format!("failed to decode PEM: {e}")))?;

        if parsed.tag() != PUBLIC_KEY_PEM_LABEL {
            return Err(Error::InvalidPublicKey(format!(
                "expected PEM label {PUBLIC_KEY_PEM_LABEL}, got {}",
                parsed.tag()
            )));
        }

        let spki = SubjectPublicKeyInfoRef::from_der(parsed.contents())
            .map_err(|e| Error::InvalidPublicKey(format!("failed to parse SPKI: {e}")))?;

        let pem = pem_text.trim().to_string();
        let oid = spki.algorithm.oid;

        if oid == ID_ED25519 {
            Ok(VerificationKey::Ed25519 { pem })
        } else if oid == RSA_ENCRYPTION {
            Ok(VerificationKey::Rsa { pem })
        } else if oid == ID_EC_PUBLIC_KEY {
            let curve = spki
                .algorithm
                .parameters_oid()
                .map_err(|e| Error::InvalidPublicKey(format!("missing EC curve: {e}")))?;
            if curve != SECP256R1 {
                return Err(Error::UnsupportedKeyType(format!("EC curve {curve}")));
            }
            Ok(VerificationKey::EcdsaP256 { pem })
        } else {
            Err(Error::UnsupportedKeyType(format!("algorithm {oid}")))
        }
    }

    /// The JWT algorithm bound to this key.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            VerificationKey::Ed25519 { .. } => Algorithm::EdDSA,
            VerificationKey::Rsa { .. } => Algorithm::RS256,
            VerificationKey::EcdsaP256 { .. } => Algorithm::ES256,
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey> {
        let key = match self {
            VerificationKey::Ed25519 { pem } => DecodingKey::from_ed_pem(pem.as_bytes()),
            VerificationKey::Rsa { pem } => DecodingKey::from_rsa_pem(pem.as_bytes()),
            VerificationKey::EcdsaP256 { pem } => DecodingKey::from_ec_pem(pem.as_bytes()),
        };
        key.map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }
}

/// Verifies assertions against a single key with a fixed algorithm.
///
/// Construction resolves both the decoding key and the validation rules, so
/// [`verify`](Self::verify) does no per-call key handling and is safe to
/// call from many requests at once.
pub struct AssertionVerifier {
    algorithm: Algorithm,
    key: DecodingKey,
    validation: Validation,
}

impl AssertionVerifier {
    /// Creates a verifier for the given key.
    pub fn new(key: &VerificationKey) -> Result<Self> {
        let algorithm = key.algorithm();
        let decoding_key = key.decoding_key()?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = ASSERTION_LEEWAY_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Drone does not stamp an audience, and time claims are optional.
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            algorithm,
            key: decoding_key,
            validation,
        })
    }

    /// Parses a PEM verification key and creates a verifier for it.
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        Self::new(&VerificationKey::from_pem(pem_text)?)
    }

    /// The algorithm every accepted assertion must be signed with.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verifies `token` and decodes its claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Assertion`] when the token is malformed, carries a
    /// bad signature, uses another algorithm, is expired or not yet valid,
    /// or its claims do not match `C`.
    pub fn verify<C>(&self, kind: AssertionKind, token: &str) -> Result<C>
    where
        C: DeserializeOwned + Clone,
    {
        let data = decode::<C>(token.trim(), &self.key, &self.validation).map_err(|e| {
            debug!(kind = %kind, error = %e, "assertion failed verification");
            Error::Assertion {
                kind,
                reason: e.to_string(),
            }
        })?;

        Ok(data.claims)
    }
}

impl fmt::Debug for AssertionVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionVerifier")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
