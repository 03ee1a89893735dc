//! Mock implementations for testing.
//!
//! Test doubles for every trait seam, enabling tests of the session layer
//! without network access, a real filesystem, or wall-clock waits.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with configurable responses and delays
//! - [`InMemoryStorage`] - Key-value storage with failure injection
//! - [`RecordingNavigator`] - Records redirect targets
//! - [`ManualClock`] - Clock advanced by hand

pub mod clock;
pub mod http;
pub mod navigator;
pub mod storage;

pub use clock::ManualClock;
pub use http::{MockHttpClient, MockResponse};
pub use navigator::RecordingNavigator;
pub use storage::InMemoryStorage;
