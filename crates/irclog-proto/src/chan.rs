//! Channel name helpers.

/// The marker a destination must start with to be treated as a channel.
pub const CHANNEL_PREFIX: char = '#';

/// Returns true if `target` names a channel rather than a user.
///
/// Only `#` channels are recognized; `&`, `+` and `!` channels are treated
/// like nicknames.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_detection() {
        assert!(is_channel_name("#rust"));
        assert!(is_channel_name("##offtopic"));
        assert!(!is_channel_name("alice"));
        assert!(!is_channel_name("&local"));
        assert!(!is_channel_name(""));
    }
}
