//! Keygate E2E test suite.
//!
//! Drives the HTTP surface end to end against an in-memory SQLite database,
//! with a recording authorizer or an in-process mock of the Discord API.
//!
//! Run with: cargo test --test keygate_e2e

mod mock_discord;

mod test_discord;
mod test_scenarios;
