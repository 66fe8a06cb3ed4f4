//! Shared setup and fixtures for the cross-crate tests.

pub mod fixtures;
pub mod setup;
