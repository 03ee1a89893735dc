//! Trait abstractions for dependency injection and testability.
//!
//! Every side effect the session layer performs goes through one of these
//! seams, so the coordination logic can be exercised against in-memory
//! doubles and reused with any HTTP stack.
//!
//! # Traits
//!
//! - [`HttpClient`] - Executes outbound HTTP requests
//! - [`KeyValueStorage`] - Durable client storage for credentials
//! - [`Navigator`] - Sends the user to a login surface
//! - [`Clock`] - Wall-clock time source

pub mod clock;
pub mod http;
pub mod navigator;
pub mod storage;

pub use clock::{Clock, SystemClock};
pub use http::{Headers, HttpClient, HttpError, Method, Request, Response, AUTHORIZATION};
pub use navigator::{NavigationError, Navigator};
pub use storage::{KeyValueStorage, StorageError};
