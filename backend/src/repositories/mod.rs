//! Persistence layer: one repository per table, each borrowing the shared pool.

pub mod api_key_repository;
pub mod guest_token_repository;
pub mod password_creation_repository;
pub mod site_repository;
pub mod user_repository;
pub mod user_setting_repository;
pub mod username_repository;
