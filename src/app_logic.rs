/*
 * This module provides the application logic layer: `TreeSession`, which owns
 * the materialized tree and drives the selection engine and the external
 * services, and the plain-text presenter used by the command line.
 * Unit tests for `TreeSession` are in `session_tests.rs`.
 */
pub mod presenter;
pub mod session;

#[cfg(test)]
mod session_tests;

pub use session::{SessionError, TreeSession};
