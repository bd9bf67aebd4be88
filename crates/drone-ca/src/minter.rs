//! Construction and signing of OpenSSH user certificates.
//!
//! Every certificate gets:
//! - a serial drawn uniformly from `1..=i64::MAX` via the [`EntropySource`]
//! - a fresh nonce from the same source
//! - a validity window of [`CLOCK_SKEW`] in the past to [`CERT_LIFETIME`]
//!   in the future, computed from the clock at signing time
//! - `permit-pty`, `permit-agent-forwarding` and `permit-port-forwarding`
//!
//! Serials are not tracked. Collisions are avoided by the size of the
//! keyspace alone.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::{Certificate, PrivateKey, PublicKey};

use crate::scope::Scope;
use crate::{Error, Result};

/// How far `valid_after` is backdated to absorb clock drift between the CA
/// and the hosts checking the certificate.
pub const CLOCK_SKEW: Duration = Duration::from_secs(30);

/// How long an issued certificate stays valid.
pub const CERT_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Extensions granted to every certificate, all with empty data.
pub const EXTENSIONS: [&str; 3] = [
    "permit-pty",
    "permit-agent-forwarding",
    "permit-port-forwarding",
];

const NONCE_LEN: usize = 32;

/// Source of cryptographically secure random bytes.
///
/// Implementations are shared across concurrent requests.
pub trait EntropySource: Send + Sync {
    /// Fills `dest` entirely or fails.
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

/// The operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// Draws a serial uniformly from `1..=i64::MAX`.
pub fn generate_serial(entropy: &dyn EntropySource) -> Result<u64> {
    loop {
        let mut buf = [0u8; 8];
        entropy
            .fill(&mut buf)
            .map_err(|e| Error::Entropy(e.to_string()))?;

        let serial = u64::from_be_bytes(buf) & i64::MAX as u64;
        if serial != 0 {
            return Ok(serial);
        }
    }
}

/// Certificate validity bounds, in Unix seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    pub valid_after: u64,
    pub valid_before: u64,
}

impl ValidityWindow {
    /// The window for a certificate signed at `now`.
    pub fn starting_at(now: u64) -> Self {
        Self {
            valid_after: now.saturating_sub(CLOCK_SKEW.as_secs()),
            valid_before: now.saturating_add(CERT_LIFETIME.as_secs()),
        }
    }

    /// The window for a certificate signed right now.
    pub fn now() -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Clock(e.to_string()))?;
        Ok(Self::starting_at(now.as_secs()))
    }

    /// Length of the window.
    pub fn width(&self) -> Duration {
        Duration::from_secs(self.valid_before - self.valid_after)
    }

    /// Whether `at` (Unix seconds) falls strictly inside the window.
    pub fn contains(&self, at: u64) -> bool {
        self.valid_after < at && at < self.valid_before
    }
}

/// Signs user certificates with the CA key.
///
/// The minter borrows its key and entropy source and keeps no state between
/// calls.
pub struct CertificateMinter<'a> {
    signing_key: &'a PrivateKey,
    entropy: &'a dyn EntropySource,
}

impl<'a> CertificateMinter<'a> {
    pub fn new(signing_key: &'a PrivateKey, entropy: &'a dyn EntropySource) -> Self {
        Self {
            signing_key,
            entropy,
        }
    }

    /// Builds and signs a user certificate for `subject` carrying `scope`.
    ///
    /// # Errors
    ///
    /// - [`Error::Entropy`] if the serial or nonce cannot be drawn
    /// - [`Error::Clock`] if the system clock is before the Unix epoch
    /// - [`Error::Signing`] if the certificate cannot be built or signed
    pub fn mint(&self, scope: &Scope, subject: &PublicKey) -> Result<Certificate> {
        let serial = generate_serial(self.entropy)?;

        let mut nonce = vec![0u8; NONCE_LEN];
        self.entropy
            .fill(&mut nonce)
            .map_err(|e| Error::Entropy(e.to_string()))?;

        let window = ValidityWindow::now()?;

        let mut builder = Builder::new(
            nonce,
            subject.key_data().clone(),
            window.valid_after,
            window.valid_before,
        )
        .map_err(signing_error)?;

        builder
            .serial(serial)
            .map_err(signing_error)?
            .key_id(&scope.key_id)
            .map_err(signing_error)?
            .cert_type(CertType::User)
            .map_err(signing_error)?;

        for principal in &scope.principals {
            builder.valid_principal(principal).map_err(signing_error)?;
        }

        for extension in EXTENSIONS {
            builder.extension(extension, "").map_err(signing_error)?;
        }

        builder.sign(self.signing_key).map_err(signing_error)
    }
}

fn signing_error(err: ssh_key::Error) -> Error {
    Error::Signing(err.to_string())
}

/// Encodes a certificate as an authorized-keys line, newline terminated.
pub fn encode_certificate(cert: &Certificate) -> Result<String> {
    let line = cert
        .to_openssh()
        .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(format!("{line}\n"))
}
