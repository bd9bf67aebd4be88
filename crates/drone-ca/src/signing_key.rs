//! Loading of the CA signing key.
//!
//! The key is accepted in any of the encodings `ssh-keygen` and OpenSSL
//! produce for an unencrypted key:
//!
//! | Block label           | Encoding | Key types               |
//! |-----------------------|----------|-------------------------|
//! | `OPENSSH PRIVATE KEY` | OpenSSH  | anything ssh-key reads  |
//! | `RSA PRIVATE KEY`     | PKCS#1   | RSA                     |
//! | `PRIVATE KEY`         | PKCS#8   | Ed25519, RSA, EC P-256  |
//! | `EC PRIVATE KEY`      | SEC1     | EC P-256                |
//!
//! PEM keys are converted to the OpenSSH representation so the rest of the
//! crate only deals with [`PrivateKey`].

use pkcs8::der::Decode;
use pkcs8::{DecodePrivateKey, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use ssh_key::private::{EcdsaKeypair, Ed25519Keypair, Ed25519PrivateKey, KeypairData, RsaKeypair};
use ssh_key::public::Ed25519PublicKey;
use ssh_key::PrivateKey;
use tracing::debug;

use crate::assertion::{ID_EC_PUBLIC_KEY, ID_ED25519, RSA_ENCRYPTION, SECP256R1};
use crate::{Error, Result};

const OPENSSH_LABEL: &str = "OPENSSH PRIVATE KEY";
const PKCS1_LABEL: &str = "RSA PRIVATE KEY";
const PKCS8_LABEL: &str = "PRIVATE KEY";
const SEC1_LABEL: &str = "EC PRIVATE KEY";
const ENCRYPTED_PKCS8_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Parses the CA private key from its configured text.
///
/// # Errors
///
/// Returns [`Error::InvalidSigningKey`] for malformed or encrypted keys,
/// unknown block labels and unsupported key types.
pub fn parse_signing_key(text: &str) -> Result<PrivateKey> {
    let text = text.trim();

    if text.starts_with(&format!("-----BEGIN {OPENSSH_LABEL}-----")) {
        return PrivateKey::from_openssh(text).map_err(invalid);
    }

    let block = pem::parse(text).map_err(|e| invalid(format!("failed to decode PEM: {e}")))?;

    let legacy_encrypted = block
        .headers()
        .get("Proc-Type")
        .is_some_and(|v| v.contains("ENCRYPTED"));
    if legacy_encrypted || block.tag() == ENCRYPTED_PKCS8_LABEL {
        return Err(encrypted());
    }

    debug!(label = block.tag(), "decoding PEM signing key");

    let keypair = match block.tag() {
        PKCS1_LABEL => {
            let key = rsa::RsaPrivateKey::from_pkcs1_der(block.contents()).map_err(invalid)?;
            rsa_keypair(key)?
        }
        PKCS8_LABEL => pkcs8_keypair(block.contents())?,
        SEC1_LABEL => {
            let key = p256::SecretKey::from_sec1_der(block.contents()).map_err(invalid)?;
            KeypairData::Ecdsa(EcdsaKeypair::NistP256 {
                public: key.public_key().into(),
                private: key.into(),
            })
        }
        other => return Err(invalid(format!("unsupported PEM label {other}"))),
    };

    PrivateKey::new(keypair, "").map_err(invalid)
}

fn pkcs8_keypair(der: &[u8]) -> Result<KeypairData> {
    let info = PrivateKeyInfo::from_der(der).map_err(invalid)?;
    let oid = info.algorithm.oid;

    if oid == ID_ED25519 {
        let key = ed25519_dalek::SigningKey::from_pkcs8_der(der).map_err(invalid)?;
        Ok(KeypairData::Ed25519(Ed25519Keypair {
            public: Ed25519PublicKey(key.verifying_key().to_bytes()),
            private: Ed25519PrivateKey::from_bytes(&key.to_bytes()),
        }))
    } else if oid == RSA_ENCRYPTION {
        rsa_keypair(rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(invalid)?)
    } else if oid == ID_EC_PUBLIC_KEY {
        let curve = info.algorithm.parameters_oid().map_err(invalid)?;
        if curve != SECP256R1 {
            return Err(invalid(format!("unsupported EC curve {curve}")));
        }
        let key = p256::SecretKey::from_pkcs8_der(der).map_err(invalid)?;
        Ok(KeypairData::Ecdsa(EcdsaKeypair::NistP256 {
            public: key.public_key().into(),
            private: key.into(),
        }))
    } else {
        Err(invalid(format!("unsupported key algorithm {oid}")))
    }
}

fn rsa_keypair(key: rsa::RsaPrivateKey) -> Result<KeypairData> {
    Ok(KeypairData::Rsa(
        RsaKeypair::try_from(key).map_err(invalid)?,
    ))
}

fn invalid(err: impl ToString) -> Error {
    Error::InvalidSigningKey(err.to_string())
}

fn encrypted() -> Error {
    invalid("encrypted private keys are not supported")
}
