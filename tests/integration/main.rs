//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to serve a small catalog and exercise the HTTP
//! fetcher and the full pipeline end-to-end against SQLite.

mod common;
mod fetcher_tests;
mod pipeline_tests;
