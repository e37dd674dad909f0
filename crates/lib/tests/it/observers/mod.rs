//! Tests for change observers.

mod change_tests;
