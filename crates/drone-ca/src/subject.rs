//! Parsing of the SSH public key submitted for certification.

use ssh_key::public::KeyData;
use ssh_key::PublicKey;
use tracing::debug;

use crate::{Error, Result};

/// Parses an OpenSSH public key line (`[options] <algorithm> <base64> [comment]`).
///
/// Surrounding whitespace, including the newline an `authorized_keys` line
/// usually ends with, is ignored. A leading `authorized_keys` options field
/// such as `restrict,pty` or `command="uptime"` is accepted and dropped, since
/// the certificate carries its own permissions. Certificates, private keys
/// and anything the OpenSSH encoding does not describe are rejected.
///
/// # Errors
///
/// Returns [`Error::SubjectKey`] carrying the raw input on failure.
pub fn parse_subject_key(raw: &str) -> Result<PublicKey> {
    let reject = |reason: String| Error::SubjectKey {
        raw: raw.to_string(),
        reason,
    };

    let line = raw.trim();
    let key = match PublicKey::from_openssh(line) {
        Ok(key) => key,
        Err(err) => {
            let key_text = strip_options(line).ok_or_else(|| reject(err.to_string()))?;
            debug!("dropping authorized_keys options from subject key");
            PublicKey::from_openssh(key_text).map_err(|_| reject(err.to_string()))?
        }
    };

    // `name@domain` algorithms, certificate types included, decode as opaque
    // blobs. They are not keys we know how to certify.
    if matches!(key.key_data(), KeyData::Other(_)) {
        return Err(reject(format!("unsupported key type {}", key.algorithm())));
    }

    Ok(key)
}

/// Splits off a leading options field, honoring double quotes.
///
/// Returns the rest of the line, or `None` when there is nothing after the
/// options or a quote is left open.
fn strip_options(line: &str) -> Option<&str> {
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                let rest = line[i..].trim_start();
                return (!rest.is_empty()).then_some(rest);
            }
            _ => {}
        }
    }
    None
}
