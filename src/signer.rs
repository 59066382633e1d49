//! Signed activation tokens
//!
//! Activation links embed the username, authenticated with a keyed blake3
//! hash so the link cannot be forged or redirected to another account.
//! Tokens carry no expiry; activation is idempotent so a stale link is
//! harmless.
//!
//! Token format: `{username}.{hex signature}`. The signing key is derived
//! from the SECRET_KEY environment variable.

use once_cell::sync::Lazy;

const KEY_CONTEXT: &str = "bboard 2024 account activation signer";

static SIGNING_KEY: Lazy<[u8; 32]> = Lazy::new(|| {
    let secret = match std::env::var("SECRET_KEY") {
        Ok(v) => v,
        Err(err) => {
            log::warn!(
                "SECRET_KEY was invalid. Reason: {:?}\r\nActivation links will invalidate every time the application is restarted.",
                err
            );
            use rand::{distributions::Alphanumeric, Rng};
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(64)
                .map(char::from)
                .collect()
        }
    };
    blake3::derive_key(KEY_CONTEXT, secret.as_bytes())
});

/// Signer error. Tampered, truncated, and malformed tokens are deliberately
/// indistinguishable.
#[derive(Debug, PartialEq)]
pub struct BadSignature;

impl std::fmt::Display for BadSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad or forged signature")
    }
}

impl std::error::Error for BadSignature {}

fn signature_for(value: &str) -> blake3::Hash {
    blake3::keyed_hash(&SIGNING_KEY, value.as_bytes())
}

/// Produce a signed token for a value.
///
/// The value must not contain `.`; usernames are validated against that
/// character at registration.
pub fn sign(value: &str) -> String {
    format!("{}.{}", value, signature_for(value).to_hex())
}

/// Verify a token and return the embedded value.
pub fn unsign(token: &str) -> Result<String, BadSignature> {
    let (value, sig) = token.rsplit_once('.').ok_or(BadSignature)?;

    // Hash::from_hex rejects garbage; Hash equality is constant-time.
    let claimed = blake3::Hash::from_hex(sig).map_err(|_| BadSignature)?;
    if signature_for(value) == claimed {
        Ok(value.to_owned())
    } else {
        Err(BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = sign("alice");
        assert_eq!(unsign(&token), Ok("alice".to_owned()));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let token = sign("alice");
        let forged = token.replacen("alice", "mallory", 1);
        assert_eq!(unsign(&forged), Err(BadSignature));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut token = sign("alice");
        // Flip the final hex digit.
        let last = token.pop().unwrap();
        token.push(if last == '0' { '1' } else { '0' });
        assert_eq!(unsign(&token), Err(BadSignature));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert_eq!(unsign(""), Err(BadSignature));
        assert_eq!(unsign("no-separator"), Err(BadSignature));
        assert_eq!(unsign("alice.nothex"), Err(BadSignature));
        assert_eq!(unsign("alice."), Err(BadSignature));
    }

    #[test]
    fn test_value_with_dots_survives() {
        // rsplit_once means only the last segment is the signature.
        let token = sign("a.b");
        assert_eq!(unsign(&token), Ok("a.b".to_owned()));
    }
}
