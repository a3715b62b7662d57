//! HTTP boundary
//!
//! Addon-protocol resources plus the operational surface (status, health,
//! metrics, admin cache controls).

pub mod addon;
pub mod admin;
pub mod health;
