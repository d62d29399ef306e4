use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

pub const PASSWORD_POLICY: &str = "Password must be 8+ characters, with at least 1 uppercase, \
1 lowercase, 1 digit, and special characters allowed.";

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Min 8 chars with an uppercase, a lowercase and a digit. Anything else
/// non-whitespace is allowed.
pub fn is_strong_password(plain: &str) -> bool {
    plain.chars().count() >= 8
        && plain.chars().any(|c| c.is_uppercase())
        && plain.chars().any(|c| c.is_lowercase())
        && plain.chars().any(|c| c.is_ascii_digit())
        && !plain.chars().any(char::is_whitespace)
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("Abcdef1!").expect("hashing should succeed");
        assert!(!verify_password("wrong", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn password_policy() {
        assert!(is_strong_password("Abcdef1!"));
        assert!(is_strong_password("Abcdefg1"));
        assert!(!is_strong_password("short"));
        assert!(!is_strong_password("Abc1!"));
        assert!(!is_strong_password("abcdefg1"));
        assert!(!is_strong_password("ABCDEFG1"));
        assert!(!is_strong_password("Abcdefgh"));
        assert!(!is_strong_password("Abcd efg1"));
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("not an email"));
        assert!(!is_valid_email(""));
    }
}
