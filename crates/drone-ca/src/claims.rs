//! Claims carried by the build and repository assertions.
//!
//! Field names follow Drone's JSON encoding of its build and repo objects.
//! Only `id` is mandatory. Drone always sends the string fields, and an
//! absent one decodes to the empty string so the derived principals keep
//! their fixed shape.

use serde::{Deserialize, Serialize};

/// Registered JWT claims (RFC 7519 §4.1).
///
/// `exp` and `nbf` are enforced by the verifier before these are decoded;
/// they are kept here for logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not before (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Issued at (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// JWT ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Claims from the build assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildClaims {
    /// Numeric build identifier, unique per Drone server.
    pub id: i64,
    /// Target of the build (branch, or deploy target for promotions).
    #[serde(default)]
    pub target: String,
    /// Per-repository build number.
    #[serde(default)]
    pub number: i64,
    /// Triggering event ("push", "pull_request", "promote", ...).
    #[serde(default)]
    pub event: String,
    /// Git reference being built.
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    /// Build status at signing time.
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Claims from the repository assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoClaims {
    /// Owning organization or user.
    #[serde(default)]
    pub namespace: String,
    /// Full repository name (`namespace/name`).
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_claims_from_drone_payload() {
        let claims: BuildClaims = serde_json::from_value(json!({
            "id": 42,
            "repo_id": 7,
            "number": 12,
            "event": "promote",
            "ref": "refs/heads/main",
            "target": "deploy",
            "status": "running",
            "author_login": "octocat",
            "exp": 1_700_000_000u64,
            "iss": "drone"
        }))
        .unwrap();

        assert_eq!(claims.id, 42);
        assert_eq!(claims.target, "deploy");
        assert_eq!(claims.number, 12);
        assert_eq!(claims.git_ref, "refs/heads/main");
        assert_eq!(claims.registered.exp, Some(1_700_000_000));
        assert_eq!(claims.registered.iss.as_deref(), Some("drone"));
    }

    #[test]
    fn test_build_claims_require_id() {
        let result = serde_json::from_value::<BuildClaims>(json!({"target": "deploy"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_build_claims_missing_target_is_empty() {
        let claims: BuildClaims = serde_json::from_value(json!({"id": 1})).unwrap();
        assert_eq!(claims.target, "");
        assert_eq!(claims.registered, RegisteredClaims::default());
    }

    #[test]
    fn test_repo_claims_from_drone_payload() {
        let claims: RepoClaims = serde_json::from_value(json!({
            "id": 7,
            "uid": "1234",
            "namespace": "acme",
            "name": "widgets",
            "slug": "acme/widgets",
            "scm": "git",
            "default_branch": "main",
            "private": true,
            "visibility": "private"
        }))
        .unwrap();

        assert_eq!(claims.namespace, "acme");
        assert_eq!(claims.slug, "acme/widgets");
        assert_eq!(claims.name, "widgets");
        assert!(claims.private);
    }

    #[test]
    fn test_repo_claims_tolerate_missing_fields() {
        let claims: RepoClaims = serde_json::from_value(json!({})).unwrap();
        assert_eq!(claims.namespace, "");
        assert_eq!(claims.slug, "");
    }
}
