//! The two smart HTTP services.

use crate::GitError;
use std::fmt;
use std::str::FromStr;

/// A git smart HTTP service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Fetch and clone.
    UploadPack,
    /// Push.
    ReceivePack,
}

impl Service {
    /// Short name, e.g. `upload-pack`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    /// Program name as clients send it, e.g. `git-upload-pack`.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Content type of an RPC response body.
    pub fn result_content_type(&self) -> String {
        format!("application/x-git-{}-result", self.as_str())
    }

    /// Content type of a ref advertisement.
    pub fn advertisement_content_type(&self) -> String {
        format!("application/x-git-{}-advertisement", self.as_str())
    }

    /// Content type clients send with an RPC request body.
    pub fn request_content_type(&self) -> String {
        format!("application/x-git-{}-request", self.as_str())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = GitError;

    /// Accepts both `upload-pack` and `git-upload-pack` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("git-").unwrap_or(s) {
            "upload-pack" => Ok(Self::UploadPack),
            "receive-pack" => Ok(Self::ReceivePack),
            _ => Err(GitError::UnknownService(s.to_string())),
        }
    }
}
