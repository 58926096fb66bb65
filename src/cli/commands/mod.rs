//! CLI command implementations
//!
//! Commands return the process exit code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | Success, or nothing to do yet |
//! | 1    | Completed with rejected submissions |
//! | 2    | Configuration or argument error |
//! | 4    | Database or mirror connection error |
//! | 5    | Fatal error |
//! | 130  | Interrupted |

pub mod alert;
pub mod init;
pub mod status;
pub mod sync;
pub mod validate;

use crate::domain::SyncError;

/// Exit code for a failed command
pub fn exit_code(error: &SyncError) -> i32 {
    match error {
        SyncError::Configuration(_) | SyncError::Validation(_) | SyncError::AmbiguousCriteria(_) => {
            2
        }
        e if e.is_connection() => 4,
        _ => 5,
    }
}
