//! Result type alias for session operations.

use super::session_error::SessionError;

/// Type alias for Results using SessionError.
///
/// # Example
///
/// ```ignore
/// use sessionkeep::error::SessionResult;
///
/// async fn load_profile(client: &AuthenticatedClient) -> SessionResult<Profile> {
///     let response = client.get("https://api.example.com/me").await?;
///     Ok(response.json()?)
/// }
/// ```
pub type SessionResult<T> = Result<T, SessionError>;
