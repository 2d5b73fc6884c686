//! Password and secret hashing helpers.

use crate::errors::{ServiceError, ServiceResult};
use bcrypt::{hash, verify};

/// Minimum length accepted for a new password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Function to hash a password or secret before storing in database
///
/// # Errors
/// Returns `ServiceError` if hashing fails
pub fn hash_password(password: &str) -> ServiceResult<String> {
    hash(password, HASH_COST)
        .map_err(|e| ServiceError::internal_error(format!("Password hashing failed: {}", e)))
}

/// Function to verify a password against the stored hash
///
/// # Errors
/// Returns `ServiceError` if verification process fails
pub fn verify_password(password: &str, hash: &str) -> ServiceResult<bool> {
    verify(password, hash)
        .map_err(|e| ServiceError::internal_error(format!("Password verification failed: {}", e)))
}

/// Checks the length rule shared by the reset and change-password paths.
pub fn validate_new_password(field: &str, password: &str) -> ServiceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::validation(
            field,
            "New password should have 6 characters or more.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hashed).unwrap());
        assert!(!verify_password("secret2", &hashed).unwrap());
    }

    #[test]
    fn test_password_length_boundary() {
        assert!(validate_new_password("password", "12345").is_err());
        assert!(validate_new_password("password", "123456").is_ok());
    }
}
