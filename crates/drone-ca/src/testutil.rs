//! Shared fixtures for tests.
//!
//! Generates fresh assertion signing keys for each supported family, mints
//! assertions the way Drone does, and builds CA and subject SSH keys. Only
//! compiled for this crate's tests or with the `testutil` feature:
//!
//! ```toml
//! [dev-dependencies]
//! drone-ca = { workspace = true, features = ["testutil"] }
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use ssh_key::private::{Ed25519Keypair, Ed25519PrivateKey, KeypairData};
use ssh_key::public::{Ed25519PublicKey, KeyData};
use ssh_key::{PrivateKey, PublicKey};

use crate::issuer::Issuer;
use crate::minter::EntropySource;
use crate::trust::TrustKey;

/// Current Unix time in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Signs assertions with one freshly generated key.
#[derive(Clone)]
pub struct AssertionSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    public_pem: String,
}

impl AssertionSigner {
    /// An Ed25519 signer (`EdDSA`).
    pub fn ed25519() -> Self {
        let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let private_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode ed25519 key");
        let public_pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode ed25519 public key");

        Self {
            algorithm: Algorithm::EdDSA,
            encoding_key: EncodingKey::from_ed_pem(private_pem.as_bytes())
                .expect("load ed25519 key"),
            public_pem,
        }
    }

    /// An RSA-2048 signer (`RS256`).
    ///
    /// RSA key generation is slow, so one key is shared by every caller in
    /// the process.
    pub fn rsa() -> Self {
        static KEY: OnceLock<(String, String)> = OnceLock::new();
        let (private_pem, public_pem) = KEY.get_or_init(|| {
            let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("generate rsa key");
            let private_pem = key.to_pkcs8_pem(LineEnding::LF).expect("encode rsa key");
            let public_pem = rsa::RsaPublicKey::from(&key)
                .to_public_key_pem(LineEnding::LF)
                .expect("encode rsa public key");
            (private_pem.to_string(), public_pem)
        });

        Self {
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("load rsa key"),
            public_pem: public_pem.clone(),
        }
    }

    /// A NIST P-256 signer (`ES256`).
    pub fn p256() -> Self {
        let key = p256::SecretKey::random(&mut OsRng);
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).expect("encode p256 key");
        let public_pem = key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode p256 public key");

        Self {
            algorithm: Algorithm::ES256,
            encoding_key: EncodingKey::from_ec_pem(private_pem.as_bytes()).expect("load p256 key"),
            public_pem,
        }
    }

    /// PEM `PUBLIC KEY` block to configure as the verification key.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Signs `claims` as a compact JWT.
    pub fn sign(&self, claims: &Value) -> String {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .expect("encode test assertion")
    }
}

/// Build claims as Drone signs them, valid for the next hour.
pub fn build_claims_json(id: i64, target: &str) -> Value {
    let now = now_unix();
    json!({
        "id": id,
        "repo_id": 1,
        "number": 12,
        "event": "promote",
        "ref": "refs/heads/main",
        "target": target,
        "status": "running",
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
    })
}

/// Repository claims as Drone signs them, valid for the next hour.
pub fn repo_claims_json(namespace: &str, slug: &str) -> Value {
    let now = now_unix();
    let name = slug.rsplit('/').next().unwrap_or(slug);
    json!({
        "id": 1,
        "namespace": namespace,
        "name": name,
        "slug": slug,
        "default_branch": "main",
        "private": true,
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
    })
}

/// Corrupts the signature segment of a compact JWT.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("compact JWT");
    let mut chars: Vec<char> = signature.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    format!("{signed}.{}", chars.into_iter().collect::<String>())
}

fn ed25519_keypair() -> KeypairData {
    let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
    KeypairData::Ed25519(Ed25519Keypair {
        public: Ed25519PublicKey(signing.verifying_key().to_bytes()),
        private: Ed25519PrivateKey::from_bytes(&signing.to_bytes()),
    })
}

/// A fresh Ed25519 CA key.
pub fn ca_signing_key() -> PrivateKey {
    PrivateKey::new(ed25519_keypair(), "drone-ca-test").expect("build CA key")
}

/// A fresh Ed25519 subject key and its OpenSSH line.
pub fn subject_key() -> (PublicKey, String) {
    let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
    let key = PublicKey::new(
        KeyData::Ed25519(Ed25519PublicKey(signing.verifying_key().to_bytes())),
        "agent@ci",
    );
    let line = key.to_openssh().expect("encode subject key");
    (key, line)
}

/// Entropy source that always fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn fill(&self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new("entropy source unavailable"))
    }
}

/// Entropy source that fills every byte with the same value.
#[derive(Clone, Copy, Debug)]
pub struct FixedEntropy(pub u8);

impl EntropySource for FixedEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand::Error> {
        dest.fill(self.0);
        Ok(())
    }
}

/// A complete set of trust material plus a subject key.
pub struct Fixture {
    pub signer: AssertionSigner,
    pub trust: Arc<TrustKey>,
    pub subject: PublicKey,
    pub subject_line: String,
}

impl Fixture {
    /// Ed25519 assertions and an Ed25519 CA.
    pub fn ed25519() -> Self {
        Self::with_signer(AssertionSigner::ed25519())
    }

    /// The given assertion signer and an Ed25519 CA.
    pub fn with_signer(signer: AssertionSigner) -> Self {
        let trust =
            TrustKey::load(signer.public_pem(), &Self::ca_text()).expect("load fixture trust key");
        let (subject, subject_line) = subject_key();

        Self {
            signer,
            trust: Arc::new(trust),
            subject,
            subject_line,
        }
    }

    fn ca_text() -> String {
        ca_signing_key()
            .to_openssh(ssh_key::LineEnding::LF)
            .expect("encode CA key")
            .to_string()
    }

    /// The CA private key in OpenSSH form, as it appears in configuration.
    pub fn ca_private_openssh(&self) -> String {
        self.trust
            .signing_key()
            .to_openssh(ssh_key::LineEnding::LF)
            .expect("encode CA key")
            .to_string()
    }

    /// An issuer over this fixture's trust material.
    pub fn issuer(&self) -> Issuer {
        Issuer::new(self.trust.clone())
    }

    /// Build and repo assertions for the canonical deploy scenario.
    pub fn deploy_assertions(&self) -> (String, String) {
        (
            self.signer.sign(&build_claims_json(42, "deploy")),
            self.signer.sign(&repo_claims_json("acme", "acme/widgets")),
        )
    }
}
