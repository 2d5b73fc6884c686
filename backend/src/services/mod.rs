//! Module for core business logic services.
//!
//! This module encapsulates the guest workflows (registration, confirmation,
//! password reset, profile updates and session credentials) and the
//! collaborators they depend on, such as the mailer and the username
//! registry.

pub mod account_service;
pub mod confirmation_service;
pub mod email_service;
pub mod password_reset_service;
pub mod registration_service;
pub mod session_token_service;
pub mod token_store;
pub mod usernames;
