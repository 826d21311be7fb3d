//! # Crate-Level Test Suite
//!
//! Cross-module tests: formula text flowing into requests, pfpng payloads
//! flowing through the decoder into the renderer, and the HTTP client
//! against an in-process engine stub.

mod client_tests;
