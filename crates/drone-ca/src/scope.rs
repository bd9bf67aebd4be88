//! Mapping from verified claims to certificate identity and principals.
//!
//! Hosts trust the CA and authorize logins by matching principals, for
//! example through `AuthorizedPrincipalsFile`. Every certificate carries four
//! principals, broadest first:
//!
//! ```text
//! drone                          any build agent
//! drone:<namespace>              any repository of the namespace
//! drone:<slug>                   this repository
//! drone:<slug>:<target>          this repository, this build target
//! ```
//!
//! The list is never reordered or shortened. An empty field still produces
//! its entry, which a host is unlikely to ever match.

use crate::claims::{BuildClaims, RepoClaims};

/// Base principal granted to every build agent.
pub const PRINCIPAL_PREFIX: &str = "drone";

/// Identity label and principals for one certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    /// Certificate key id, `drone-<build id>`.
    pub key_id: String,
    /// Principals, broadest to narrowest.
    pub principals: Vec<String>,
}

/// Derives the certificate scope from a verified build and repository.
pub fn derive_scope(build: &BuildClaims, repo: &RepoClaims) -> Scope {
    Scope {
        key_id: format!("{PRINCIPAL_PREFIX}-{}", build.id),
        principals: vec![
            PRINCIPAL_PREFIX.to_string(),
            format!("{PRINCIPAL_PREFIX}:{}", repo.namespace),
            format!("{PRINCIPAL_PREFIX}:{}", repo.slug),
            format!("{PRINCIPAL_PREFIX}:{}:{}", repo.slug, build.target),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::RegisteredClaims;
    use proptest::prelude::*;

    fn build(id: i64, target: &str) -> BuildClaims {
        BuildClaims {
            id,
            target: target.to_string(),
            number: 0,
            event: String::new(),
            git_ref: String::new(),
            status: String::new(),
            registered: RegisteredClaims::default(),
        }
    }

    fn repo(namespace: &str, slug: &str) -> RepoClaims {
        RepoClaims {
            namespace: namespace.to_string(),
            slug: slug.to_string(),
            name: String::new(),
            default_branch: String::new(),
            private: false,
            registered: RegisteredClaims::default(),
        }
    }

    #[test]
    fn test_deploy_scope() {
        let scope = derive_scope(&build(42, "deploy"), &repo("acme", "acme/widgets"));

        assert_eq!(scope.key_id, "drone-42");
        assert_eq!(
            scope.principals,
            vec![
                "drone",
                "drone:acme",
                "drone:acme/widgets",
                "drone:acme/widgets:deploy",
            ]
        );
    }

    #[test]
    fn test_empty_target_keeps_fourth_principal() {
        let scope = derive_scope(&build(7, ""), &repo("acme", "acme/widgets"));

        assert_eq!(scope.principals.len(), 4);
        assert_eq!(scope.principals[3], "drone:acme/widgets:");
    }

    #[test]
    fn test_empty_repo_fields_keep_shape() {
        let scope = derive_scope(&build(1, "main"), &repo("", ""));
        assert_eq!(
            scope.principals,
            vec!["drone", "drone:", "drone:", "drone::main"]
        );
    }

    #[test]
    fn test_negative_build_id() {
        let scope = derive_scope(&build(-3, "main"), &repo("a", "a/b"));
        assert_eq!(scope.key_id, "drone--3");
    }

    proptest! {
        #[test]
        fn prop_four_principals_broadest_first(
            id in any::<i64>(),
            target in ".*",
            namespace in "[a-z0-9-]{0,16}",
            name in "[a-z0-9._-]{0,16}",
        ) {
            let slug = format!("{namespace}/{name}");
            let scope = derive_scope(&build(id, &target), &repo(&namespace, &slug));

            prop_assert_eq!(scope.principals.len(), 4);
            prop_assert_eq!(&scope.principals[0], PRINCIPAL_PREFIX);
            prop_assert_eq!(&scope.principals[1], &format!("drone:{namespace}"));
            prop_assert_eq!(&scope.principals[2], &format!("drone:{slug}"));
            prop_assert_eq!(&scope.principals[3], &format!("drone:{slug}:{target}"));
            // Each narrower principal extends the repository-level one.
            prop_assert!(scope.principals[3].starts_with(&scope.principals[2]));
            prop_assert!(scope.key_id.contains(&id.to_string()));
        }

        #[test]
        fn prop_derivation_is_deterministic(id in any::<i64>(), target in "[a-z]{0,8}") {
            let b = build(id, &target);
            let r = repo("acme", "acme/widgets");
            prop_assert_eq!(derive_scope(&b, &r), derive_scope(&b, &r));
        }
    }
}
