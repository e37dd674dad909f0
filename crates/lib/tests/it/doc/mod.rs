//! Document-level tests: construction, transactions and cloning.

mod basic_operations;
mod clone_tests;
