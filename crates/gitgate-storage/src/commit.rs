//! Read-only projection of a commit object.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use chrono::{DateTime, FixedOffset};

/// Summary of a commit: its tree, parents, author and when it was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id.
    pub id: ObjectId,
    /// Root tree of the commit.
    pub tree: ObjectId,
    /// Parent commits.
    pub parents: Vec<ObjectId>,
    /// Author name, without the email address.
    pub author: String,
    /// Full commit message.
    pub message: String,
    /// Committer timestamp in the committer's time zone.
    pub date: DateTime<FixedOffset>,
}

impl CommitInfo {
    /// Parses a commit object.
    pub fn parse(commit: &GitObject) -> Result<Self> {
        if commit.object_type != ObjectType::Commit {
            return Err(StorageError::InvalidObject(format!(
                "{} is a {}, not a commit",
                commit.id,
                commit.object_type.as_str()
            )));
        }

        let content = String::from_utf8_lossy(&commit.data);
        let (headers, message) = content.split_once("\n\n").unwrap_or((&content, ""));

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = String::new();
        let mut date = None;

        for line in headers.lines() {
            if let Some(hex) = line.strip_prefix("tree ") {
                tree = Some(ObjectId::from_hex(hex.trim())?);
            } else if let Some(hex) = line.strip_prefix("parent ") {
                parents.push(ObjectId::from_hex(hex.trim())?);
            } else if let Some(ident) = line.strip_prefix("author ") {
                author = match ident.find('<') {
                    Some(end) => ident[..end].trim().to_string(),
                    None => ident.trim().to_string(),
                };
            } else if let Some(ident) = line.strip_prefix("committer ") {
                date = parse_signature_time(ident);
            }
        }

        let tree = tree.ok_or_else(|| {
            StorageError::InvalidObject(format!("commit {} has no tree", commit.id))
        })?;
        let date = date.ok_or_else(|| {
            StorageError::InvalidObject(format!("commit {} has no committer date", commit.id))
        })?;

        Ok(Self {
            id: commit.id,
            tree,
            parents,
            author,
            message: message.to_string(),
            date,
        })
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Parses the `<seconds> <+hhmm>` tail of an author/committer line.
fn parse_signature_time(ident: &str) -> Option<DateTime<FixedOffset>> {
    let after_email = &ident[ident.rfind('>')? + 1..];
    let mut parts = after_email.split_whitespace();
    let seconds: i64 = parts.next()?.parse().ok()?;
    let zone = parts.next().unwrap_or("+0000");

    let (sign, digits) = match zone.split_at_checked(1)? {
        ("-", rest) => (-1, rest),
        ("+", rest) => (1, rest),
        _ => return None,
    };
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;

    Some(DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset))
}
