//! Caller identity from request headers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Extracts the username from an `Authorization: Basic <base64>` value.
///
/// Returns `None` for other schemes, undecodable values and empty names.
/// The password is not checked here; verifying credentials is left to
/// whatever sits in front of the server.
pub fn basic_auth_username(header: &str) -> Option<String> {
    let encoded = header.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let username = text.split_once(':').map_or(text.as_str(), |(user, _)| user);
    if username.is_empty() {
        None
    } else {
        Some(username.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_username() {
        let header = format!("Basic {}", STANDARD.encode("alice:secret"));
        assert_eq!(basic_auth_username(&header).as_deref(), Some("alice"));

        let no_password = format!("Basic {}", STANDARD.encode("bob"));
        assert_eq!(basic_auth_username(&no_password).as_deref(), Some("bob"));
    }

    #[test]
    fn test_basic_auth_rejects() {
        assert_eq!(basic_auth_username("Bearer abc"), None);
        assert_eq!(basic_auth_username("Basic !!!"), None);
        let empty = format!("Basic {}", STANDARD.encode(":pw"));
        assert_eq!(basic_auth_username(&empty), None);
    }
}
