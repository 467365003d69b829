//! End-to-end tests for the IdP server live under `tests/`.
