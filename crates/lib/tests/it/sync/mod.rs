//! Tests for the update protocol.

mod rebase_tests;
mod state_reset_tests;
