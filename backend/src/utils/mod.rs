//! Collection of general utility functions and common traits.
//!
//! This module serves as a repository for small, reusable helper functions
//! that do not fit into other specific domain modules.

use validator::ValidateEmail;

pub mod generate_random_string;
pub mod jwt;
pub mod password;

/// Syntax check applied to every submitted email address.
pub fn is_valid_email(email: &str) -> bool {
    !email.trim().is_empty() && email.to_string().validate_email()
}

/// Treats blank strings as missing values.
pub fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
