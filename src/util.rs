use chrono::Utc;

use crate::error::AddError;
use crate::model::Timestamp;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 50;

pub fn now() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Checks a raw place name and returns it trimmed. Lengths count characters.
pub fn validate_place_name(raw: &str) -> Result<&str, AddError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 {
        Err(AddError::EmptyName)
    } else if len < MIN_NAME_LEN {
        Err(AddError::TooShort)
    } else if len > MAX_NAME_LEN {
        Err(AddError::TooLong)
    } else {
        Ok(name)
    }
}

/// Key used for case-insensitive name comparison.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Escapes a string so any consuming view renders it as literal text.
pub fn escape_markup(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Reverses [`escape_markup`] for plain-text output.
pub fn unescape_markup(escaped: &str) -> String {
    escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn votes_label(n: u64) -> String {
    if n == 1 {
        format!("{} vote", n)
    } else {
        format!("{} votes", n)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_short_and_long_names() {
        assert_eq!(validate_place_name(""), Err(AddError::EmptyName));
        assert_eq!(validate_place_name("   \t "), Err(AddError::EmptyName));
        assert_eq!(validate_place_name(" x "), Err(AddError::TooShort));
        assert_eq!(validate_place_name(&"a".repeat(51)), Err(AddError::TooLong));
    }

    #[test]
    fn accepts_boundaries_and_trims() {
        assert_eq!(validate_place_name("  ab  "), Ok("ab"));
        let fifty = "b".repeat(50);
        assert_eq!(validate_place_name(&format!(" {} ", fifty)), Ok(fifty.as_str()));
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(validate_place_name("🍜"), Err(AddError::TooShort));
        assert!(validate_place_name(&"é".repeat(50)).is_ok());
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_markup("<b>Tom & Jerry's \"Diner\"</b>"),
            "&lt;b&gt;Tom &amp; Jerry&#39;s &quot;Diner&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_markup("Plain Cafe"), "Plain Cafe");
    }

    #[test]
    fn unescape_restores_escaped_text() {
        let raw = "<b>Tom & Jerry's \"Diner\"</b> &lt;";
        assert_eq!(unescape_markup(&escape_markup(raw)), raw);
    }

    #[test]
    fn pluralizes_votes() {
        assert_eq!(votes_label(0), "0 votes");
        assert_eq!(votes_label(1), "1 vote");
        assert_eq!(votes_label(7), "7 votes");
    }
}
