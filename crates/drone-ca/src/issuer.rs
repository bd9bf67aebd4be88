//! Per-request issuance pipeline.
//!
//! ```text
//! build JWT ──verify──┐
//! repo JWT  ──verify──┼──> derive scope ──> mint ──> encode
//! pubkey    ──parse───┘
//! ```
//!
//! The first failing step ends the request. Verification and parsing
//! failures are client errors. Entropy, clock and signing failures are
//! server errors. Nothing is retried and nothing is shared between requests
//! except the read-only [`TrustKey`].

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::assertion::AssertionKind;
use crate::claims::{BuildClaims, RepoClaims};
use crate::minter::{encode_certificate, CertificateMinter, EntropySource, OsEntropy};
use crate::scope::derive_scope;
use crate::subject::parse_subject_key;
use crate::trust::TrustKey;
use crate::{Error, Result};

/// Raw inputs of one issuance request.
#[derive(Clone, Debug, Default)]
pub struct IssuanceRequest {
    /// Signed build assertion.
    pub build: String,
    /// Signed repository assertion.
    pub repo: String,
    /// OpenSSH public key to certify.
    pub pubkey: String,
}

/// A signed certificate and the fields worth logging about it.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    /// Authorized-keys encoding returned to the client.
    pub encoded: String,
    pub serial: u64,
    pub key_id: String,
    pub principals: Vec<String>,
    pub valid_after: u64,
    pub valid_before: u64,
}

/// Issues certificates against one set of trust material.
#[derive(Clone)]
pub struct Issuer {
    trust: Arc<TrustKey>,
    entropy: Arc<dyn EntropySource>,
}

impl Issuer {
    /// Creates an issuer drawing randomness from the OS.
    pub fn new(trust: Arc<TrustKey>) -> Self {
        Self::with_entropy(trust, Arc::new(OsEntropy))
    }

    /// Creates an issuer with a specific entropy source.
    pub fn with_entropy(trust: Arc<TrustKey>, entropy: Arc<dyn EntropySource>) -> Self {
        Self { trust, entropy }
    }

    /// The trust material this issuer signs with.
    pub fn trust(&self) -> &TrustKey {
        &self.trust
    }

    /// Runs the full pipeline for one request.
    ///
    /// Failures are logged here, at WARN for client errors and at ERROR for
    /// internal faults, so callers only map them to a response.
    pub fn issue(&self, request: &IssuanceRequest) -> Result<IssuedCertificate> {
        self.try_issue(request).inspect_err(log_failure)
    }

    fn try_issue(&self, request: &IssuanceRequest) -> Result<IssuedCertificate> {
        let verifier = self.trust.verifier();
        let build: BuildClaims = verifier.verify(AssertionKind::Build, &request.build)?;
        let repo: RepoClaims = verifier.verify(AssertionKind::Repo, &request.repo)?;

        let subject = parse_subject_key(&request.pubkey)?;
        let scope = derive_scope(&build, &repo);

        let minter = CertificateMinter::new(self.trust.signing_key(), self.entropy.as_ref());
        let cert = minter.mint(&scope, &subject)?;
        let encoded = encode_certificate(&cert)?;

        info!(
            key_id = %scope.key_id,
            serial = cert.serial(),
            principals = ?scope.principals,
            repo = %repo.slug,
            build_number = build.number,
            event = %build.event,
            valid_before = cert.valid_before(),
            "issued certificate"
        );

        Ok(IssuedCertificate {
            encoded,
            serial: cert.serial(),
            key_id: scope.key_id,
            principals: scope.principals,
            valid_after: cert.valid_after(),
            valid_before: cert.valid_before(),
        })
    }
}

fn log_failure(err: &Error) {
    match err {
        Error::SubjectKey { raw, reason } => {
            warn!(pubkey = %raw, error = %reason, "rejected subject key");
        }
        err if err.is_client_error() => {
            warn!(error = %err, "rejected issuance request");
        }
        err => {
            error!(error = %err, "certificate issuance failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        build_claims_json, repo_claims_json, tamper_signature, FailingEntropy, Fixture,
    };

    fn request(fixture: &Fixture) -> IssuanceRequest {
        IssuanceRequest {
            build: fixture.signer.sign(&build_claims_json(42, "deploy")),
            repo: fixture
                .signer
                .sign(&repo_claims_json("acme", "acme/widgets")),
            pubkey: fixture.subject_line.clone(),
        }
    }

    #[test]
    fn test_issue_success() {
        let fixture = Fixture::ed25519();
        let issued = fixture.issuer().issue(&request(&fixture)).unwrap();

        assert_eq!(issued.key_id, "drone-42");
        assert_eq!(
            issued.principals,
            vec![
                "drone",
                "drone:acme",
                "drone:acme/widgets",
                "drone:acme/widgets:deploy"
            ]
        );
        assert!(issued.valid_after < issued.valid_before);
    }

    #[test]
    fn test_bad_build_assertion_is_client_error() {
        let fixture = Fixture::ed25519();
        let mut req = request(&fixture);
        req.build = tamper_signature(&req.build);

        let err = fixture.issuer().issue(&req).unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(
            err,
            Error::Assertion {
                kind: AssertionKind::Build,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_repo_assertion_is_client_error() {
        let fixture = Fixture::ed25519();
        let mut req = request(&fixture);
        req.repo = tamper_signature(&req.repo);

        let err = fixture.issuer().issue(&req).unwrap_err();
        assert!(matches!(
            err,
            Error::Assertion {
                kind: AssertionKind::Repo,
                ..
            }
        ));
    }

    #[test]
    fn test_swapped_assertions_are_rejected() {
        // A repo token has no build id, so it cannot stand in for a build.
        let fixture = Fixture::ed25519();
        let mut req = request(&fixture);
        std::mem::swap(&mut req.build, &mut req.repo);

        let err = fixture.issuer().issue(&req).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_bad_pubkey_is_client_error() {
        let fixture = Fixture::ed25519();
        let mut req = request(&fixture);
        req.pubkey = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA".to_string();

        let err = fixture.issuer().issue(&req).unwrap_err();
        assert!(matches!(err, Error::SubjectKey { .. }));
    }

    #[test]
    fn test_entropy_failure_is_server_error() {
        let fixture = Fixture::ed25519();
        let issuer = Issuer::with_entropy(fixture.trust.clone(), Arc::new(FailingEntropy));

        let err = issuer.issue(&request(&fixture)).unwrap_err();
        assert!(matches!(err, Error::Entropy(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_verification_runs_before_entropy() {
        // A bad assertion must be rejected as a client error even when the
        // entropy source is broken.
        let fixture = Fixture::ed25519();
        let issuer = Issuer::with_entropy(fixture.trust.clone(), Arc::new(FailingEntropy));
        let mut req = request(&fixture);
        req.build = tamper_signature(&req.build);

        assert!(issuer.issue(&req).unwrap_err().is_client_error());
    }
}
