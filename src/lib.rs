//! SEP-10 authentication library
//!
//! Challenge issuance and validation for Stellar web authentication, with
//! the configuration, storage and error mapping needed to embed it in a
//! backend server.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
