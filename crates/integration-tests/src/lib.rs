//! End-to-end tests for Conduit live under `tests/`
