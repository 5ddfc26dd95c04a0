//! Canonical naming for the MCP gateway.
//!
//! A canonical name is `<server>__<entity>` — the globally unique identifier
//! a downstream client sees for a tool or prompt. This crate owns encoding,
//! decoding, and the validation rules for server and group names.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Separator between the server name and the entity (tool/prompt) name in a
/// canonical name. Chosen, as upstream MCP gateways do, from a character
/// class that's never itself a valid standalone identifier character.
pub const SEPARATOR: &str = "__";

lazy_static! {
    static ref SERVER_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref GROUP_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("server name '{0}' is empty")]
    Empty(String),
    #[error("server name '{0}' must match ^[A-Za-z0-9_-]+$")]
    InvalidCharacters(String),
    #[error("server name '{0}' must not contain '__'")]
    ContainsSeparator(String),
    #[error("server name '{0}' must not end in '_'")]
    TrailingUnderscore(String),
    #[error("group name '{0}' must match ^[A-Za-z0-9][A-Za-z0-9_-]*$")]
    InvalidGroupName(String),
}

/// Validate a server name against spec §3/§6:
/// `^[A-Za-z0-9_-]+$`, no `__` substring, no trailing `_`.
pub fn validate_server_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty(name.to_string()));
    }
    if !SERVER_NAME_RE.is_match(name) {
        return Err(NameError::InvalidCharacters(name.to_string()));
    }
    if name.contains(SEPARATOR) {
        return Err(NameError::ContainsSeparator(name.to_string()));
    }
    if name.ends_with('_') {
        return Err(NameError::TrailingUnderscore(name.to_string()));
    }
    Ok(())
}

/// Validate a tool-group name: `^[A-Za-z0-9][A-Za-z0-9_-]*$`.
pub fn validate_group_name(name: &str) -> Result<(), NameError> {
    if !GROUP_NAME_RE.is_match(name) {
        return Err(NameError::InvalidGroupName(name.to_string()));
    }
    Ok(())
}

/// Build the canonical name for an entity owned by `server`.
///
/// Does not itself validate `server` or `entity` — callers that accept
/// untrusted server names should call [`validate_server_name`] first, since
/// that's what guarantees the prefix-free encoding `split` relies on.
pub fn join(server: &str, entity: &str) -> String {
    format!("{server}{SEPARATOR}{entity}")
}

/// Split a canonical name on the *first* occurrence of `__`.
///
/// Returns `None` if the separator is absent, mirroring spec §4.1's
/// `ok=false` signal (callers map that to `InvalidName`).
pub fn split(name: &str) -> Option<(&str, &str)> {
    name.split_once(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_server_names_pass() {
        for name in ["weather", "weather-api", "weather_api", "a1", "A-B_C1"] {
            assert!(validate_server_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(validate_server_name(""), Err(NameError::Empty(String::new())));
    }

    #[test]
    fn rejects_double_underscore() {
        assert!(matches!(
            validate_server_name("weather__api"),
            Err(NameError::ContainsSeparator(_))
        ));
    }

    #[test]
    fn rejects_trailing_underscore() {
        assert!(matches!(
            validate_server_name("weather_"),
            Err(NameError::TrailingUnderscore(_))
        ));
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(
            validate_server_name("weather.api"),
            Err(NameError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_server_name("weather api"),
            Err(NameError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn group_names() {
        assert!(validate_group_name("travel").is_ok());
        assert!(validate_group_name("all-weather").is_ok());
        assert!(validate_group_name("_travel").is_err());
        assert!(validate_group_name("").is_err());
    }

    #[test]
    fn split_is_left_inverse_of_join() {
        // I-4: Split(Join(s, e)) = (s, e, true) for any valid server name s
        // and any non-empty entity e.
        for (server, entity) in [("weather", "now"), ("a", "b"), ("my-server", "tool_name")] {
            assert!(validate_server_name(server).is_ok());
            let canonical = join(server, entity);
            assert_eq!(split(&canonical), Some((server, entity)));
        }
    }

    #[test]
    fn split_uses_first_occurrence() {
        // A prompt/tool name may itself legally contain "__"; split must not
        // be greedy about it.
        assert_eq!(split("weather__now__extra"), Some(("weather", "now__extra")));
    }

    #[test]
    fn split_without_separator_is_none() {
        assert_eq!(split("weathernow"), None);
    }
}
