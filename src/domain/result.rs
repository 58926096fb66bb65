//! Result type alias for dlsync

use super::errors::SyncError;

/// Result type alias for dlsync operations
///
/// # Examples
///
/// ```
/// use dlsync::domain::result::Result;
/// use dlsync::domain::errors::SyncError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(SyncError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, SyncError>;
