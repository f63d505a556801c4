//! Device token format validation.
//!
//! Runs before anything is queued: tokens that fail here never reach the
//! network and are not counted as delivery failures.

use std::collections::HashSet;

use super::DeviceToken;

const TOKEN_PREFIXES: [&str; 2] = ["ExponentPushToken[", "ExpoPushToken["];

/// Lengths of the hyphen-separated groups of a bare device identifier.
const BARE_ID_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// Whether `token` matches the gateway's canonical token shape.
pub fn is_valid_token(token: &str) -> bool {
    for prefix in TOKEN_PREFIXES {
        if let Some(inner) = token.strip_prefix(prefix) {
            return match inner.strip_suffix(']') {
                Some(id) => !id.is_empty() && !id.contains(['[', ']']) && !id.contains(char::is_whitespace),
                None => false,
            };
        }
    }

    is_bare_identifier(token)
}

fn is_bare_identifier(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == BARE_ID_GROUPS.len()
        && groups
            .iter()
            .zip(BARE_ID_GROUPS)
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Recipients split into what will be dispatched and what was dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatedRecipients {
    /// Valid, de-duplicated, in first-seen order
    pub valid: Vec<DeviceToken>,
    /// Malformed tokens, dropped silently
    pub rejected: Vec<DeviceToken>,
}

/// Filter recipients to the tokens that may be dispatched.
///
/// Duplicates of an already accepted token are discarded so one device is
/// never pushed twice for the same logical send.
pub fn validate_recipients(recipients: Vec<DeviceToken>) -> ValidatedRecipients {
    let mut seen = HashSet::with_capacity(recipients.len());
    let mut result = ValidatedRecipients::default();

    for token in recipients {
        if !is_valid_token(&token) {
            result.rejected.push(token);
        } else if seen.insert(token.clone()) {
            result.valid.push(token);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_tokens() {
        assert!(is_valid_token("ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]"));
        assert!(is_valid_token("ExpoPushToken[abc123]"));
        assert!(!is_valid_token("ExponentPushToken[]"));
        assert!(!is_valid_token("ExponentPushToken[abc"));
        assert!(!is_valid_token("ExponentPushToken[a b]"));
        assert!(!is_valid_token(" ExponentPushToken[abc]"));
        assert!(!is_valid_token("FcmToken[abc]"));
        assert!(!is_valid_token(""));
    }

    #[test]
    fn test_bare_identifier() {
        assert!(is_valid_token("3f2b1c4d-aaaa-bbbb-cccc-0123456789ab"));
        assert!(!is_valid_token("3f2b1c4d-aaaa-bbbb-cccc-0123456789a"));
        assert!(!is_valid_token("3f2b1c4d-aaaa-bbbb-cccc-0123456789a!"));
        assert!(!is_valid_token("3f2b1c4daaaabbbbcccc0123456789ab"));
    }

    #[test]
    fn test_validate_recipients_drops_and_dedups() {
        let result = validate_recipients(vec![
            "ExponentPushToken[a]".to_string(),
            "garbage".to_string(),
            "ExponentPushToken[b]".to_string(),
            "ExponentPushToken[a]".to_string(),
        ]);

        assert_eq!(result.valid, vec!["ExponentPushToken[a]", "ExponentPushToken[b]"]);
        assert_eq!(result.rejected, vec!["garbage"]);
    }
}
