//! Authentication module for guest sessions and access control.
//!
//! This module provides login, logout, session credentials, the identity
//! middleware and the caller's own account endpoints.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
