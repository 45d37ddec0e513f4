//! Integration tests for Price-Sync
//!
//! These drive the executor and the batch coordinator end-to-end against an
//! in-memory store, a scripted fetcher and a fixed host table.

mod common;

mod batch_tests;
mod sync_tests;
