//! Startup configuration.

use clap::Parser;
use drone_ca::TrustKey;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "drone-ca", version, about = "SSH certificate authority for Drone CI builds")]
pub struct Args {
    /// Listen address. A bare `:port` listens on all interfaces.
    #[arg(long, env = "CA_BIND", default_value = ":80")]
    pub bind: String,
    /// Log at DEBUG unless RUST_LOG says otherwise.
    #[arg(long, env = "CA_DEBUG", default_value_t = false)]
    pub debug: bool,
    /// PEM public key that signs build and repo assertions.
    #[arg(long, env = "CA_ENV_PUBLIC_KEY", hide_env_values = true)]
    pub env_public_key: String,
    /// CA private key, OpenSSH or PEM (PKCS#1, PKCS#8, SEC1) encoded.
    #[arg(long, env = "CA_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,
}

impl Args {
    /// Log filter from `RUST_LOG`, falling back to the `--debug` level.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.debug { "debug" } else { "info" })
        })
    }
}

/// Everything the server needs, validated once before serving.
#[derive(Debug)]
pub struct Config {
    pub listen: String,
    pub trust: TrustKey,
}

impl Config {
    /// Parses the key material and normalizes the listen address.
    pub fn load(args: &Args) -> drone_ca::Result<Self> {
        let trust = TrustKey::load(&args.env_public_key, &args.private_key)?;
        Ok(Self {
            listen: listen_addr(&args.bind),
            trust,
        })
    }
}

/// Expands a bare `:port` to `0.0.0.0:port`.
pub fn listen_addr(bind: &str) -> String {
    match bind.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => bind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_ca::testutil::{AssertionSigner, Fixture};

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["drone-ca"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(listen_addr(":80"), "0.0.0.0:80");
        assert_eq!(listen_addr(":8443"), "0.0.0.0:8443");
        assert_eq!(listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
        assert_eq!(listen_addr("[::1]:80"), "[::1]:80");
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--env-public-key", "pem", "--private-key", "key"]).unwrap();
        assert_eq!(args.bind, ":80");
        assert!(!args.debug);
    }

    #[test]
    fn test_keys_are_required() {
        assert!(parse(&["--private-key", "key"]).is_err());
        assert!(parse(&["--env-public-key", "pem"]).is_err());
    }

    #[test]
    fn test_load_builds_trust_material() {
        let fixture = Fixture::with_signer(AssertionSigner::p256());
        let args = Args {
            bind: ":8080".to_string(),
            debug: true,
            env_public_key: fixture.signer.public_pem().to_string(),
            private_key: fixture.ca_private_openssh(),
        };

        let config = Config::load(&args).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.trust.ca_public_key(), fixture.trust.ca_public_key());
    }

    #[test]
    fn test_load_accepts_pem_ca_key() {
        use p256::pkcs8::LineEnding;

        let fixture = Fixture::ed25519();
        let ca = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let args = Args {
            bind: ":80".to_string(),
            debug: false,
            env_public_key: fixture.signer.public_pem().to_string(),
            private_key: ca.to_sec1_pem(LineEnding::LF).unwrap().to_string(),
        };

        let config = Config::load(&args).unwrap();
        assert_eq!(
            config.trust.ca_public_key().algorithm(),
            ssh_key::Algorithm::Ecdsa {
                curve: ssh_key::EcdsaCurve::NistP256
            }
        );
    }

    #[test]
    fn test_load_rejects_bad_keys() {
        let fixture = Fixture::ed25519();
        let args = Args {
            bind: ":80".to_string(),
            debug: false,
            env_public_key: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n"
                .to_string(),
            private_key: fixture.ca_private_openssh(),
        };
        assert!(Config::load(&args).is_err());

        let args = Args {
            env_public_key: fixture.signer.public_pem().to_string(),
            private_key: "not a key".to_string(),
            ..args
        };
        assert!(Config::load(&args).is_err());
    }
}
