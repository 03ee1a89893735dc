//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`FileStorage`] - JSON file in the home directory
//! - [`StorageWatcher`] - picks up session changes made by other processes
//! - [`BrowserNavigator`] / [`LogNavigator`] - post-logout redirect targets
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles:
//! - [`mock::MockHttpClient`] - Configurable HTTP responses
//! - [`mock::InMemoryStorage`] - Storage with failure injection
//! - [`mock::RecordingNavigator`] - Records redirect targets
//! - [`mock::ManualClock`] - Time that only moves when told to

pub mod browser_navigator;
pub mod file_storage;
pub mod mock;
pub mod reqwest_http;
pub mod storage_watcher;

pub use browser_navigator::{BrowserNavigator, LogNavigator};
pub use file_storage::{ExternalChange, FileStorage};
pub use mock::{InMemoryStorage, ManualClock, MockHttpClient, RecordingNavigator};
pub use reqwest_http::ReqwestHttpClient;
pub use storage_watcher::StorageWatcher;
