//! Keygate server library.
//!
//! Single-use access keys that grant a privilege to a subject for a fixed
//! window: key storage and redemption, timed grants with durable revocation,
//! and the HTTP surface around them.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
