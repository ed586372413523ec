//! Integration Tests Module
//!
//! End-to-end tracking tests against a wiremock-backed REST API and an
//! in-process push transport.

// Shared fixtures
mod helpers;

// Polling, retries, and cancellation over HTTP
mod polling_test;

// Push updates interleaved with polling
mod realtime_test;

// Config file to running tracker
mod state_test;
