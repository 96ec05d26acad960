//! Account definitions loaded from YAML
//!
//! ```yaml
//! users:
//!   - user_id: usr_002
//!     username: alice
//!     password: wonderland
//!     token: mock_token_alice
//!     plan: standard
//!     gpu_quota: 8
//! ```

use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;

use crate::domain::types::User;

#[derive(Debug, derive_more::Display)]
pub enum UsersFileError {
    #[display("Failed to read users file")]
    Read,
    #[display("Failed to parse users file")]
    Parse,
    #[display("Duplicate token in users file: {token}")]
    DuplicateToken { token: String },
}

impl core::error::Error for UsersFileError {}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
}

/// Parses a users document
pub fn parse_users(contents: &str) -> Result<Vec<User>, Report<UsersFileError>> {
    let file: UsersFile = serde_yaml::from_str(contents).change_context(UsersFileError::Parse)?;

    let mut tokens = std::collections::HashSet::new();
    for user in &file.users {
        if !tokens.insert(user.token.as_str()) {
            return Err(Report::new(UsersFileError::DuplicateToken {
                token: user.token.clone(),
            }));
        }
    }
    Ok(file.users)
}

/// Reads and parses the users file at `path`
pub fn load_users(path: &Path) -> Result<Vec<User>, Report<UsersFileError>> {
    let contents = std::fs::read_to_string(path)
        .change_context(UsersFileError::Read)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;
    parse_users(&contents).attach_printable_lazy(|| format!("path: {}", path.display()))
}
