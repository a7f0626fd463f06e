//! Property-based tests for the configuration store

mod storage_roundtrip;
