use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::database::BoxError;

pub fn hash_password(password: &str) -> Result<String, BoxError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| format!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Checks `password` against a stored hash. Users without a password never match.
pub fn verify_password(password: &str, password_hash: Option<&str>) -> Result<bool, BoxError> {
    let Some(password_hash) = password_hash else {
        return Ok(false);
    };

    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| format!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse battery").unwrap();

        assert!(verify_password("correct horse battery", Some(&hash)).unwrap());
        assert!(!verify_password("wrong password", Some(&hash)).unwrap());
    }

    #[test]
    fn test_salted_hashes_differ() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_missing_hash_never_verifies() {
        assert!(!verify_password("anything", None).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", Some("not-a-phc-string")).is_err());
    }
}
