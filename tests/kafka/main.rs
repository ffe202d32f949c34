//! Kafka E2E tests
//!
//! Run against a real broker at `kafka:9092` (the docker-compose service
//! name). Ignored by default: `cargo test --test kafka -- --ignored`.

mod typed_roundtrip;
