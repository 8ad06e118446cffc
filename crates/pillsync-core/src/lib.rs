//! Core types and trait definitions for PillSync.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement [`store::CareStore`] and [`store::AccountStore`]; every mutation
//! flows through [`service::CareService`], which enforces ownership and
//! publishes change notifications.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod emergency;
pub mod error;
pub mod identity;
pub mod intake;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
