use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

const MAX_USERNAME_LEN: usize = 30;
const MAX_SHORT_CODE_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackedInstagramPage {
    pub id: u64,
    #[schema(example = "shabra.agency")]
    pub username: String,
    pub follower_count: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub reel_count: i64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstagramReel {
    pub id: u64,
    pub page_id: u64,
    #[schema(example = "https://www.instagram.com/reel/C1a2b3c4d5e/")]
    pub post_url: String,
    #[schema(example = "C1a2b3c4d5e")]
    pub short_code: String,
    pub view_count: u64,
    #[schema(value_type = String, format = "date-time")]
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Canonical page handle: trimmed, leading `@` removed, lowercase, and
/// limited to Instagram's `[a-z0-9._]{1,30}` alphabet.
pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches('@').to_lowercase();

    let valid = !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_');

    valid.then_some(name)
}

pub fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));

    matches!(rest, Some(r) if !r.is_empty() && !r.starts_with('/') && !r.contains(char::is_whitespace))
}

/// Pulls the code out of `.../p/<code>/` or `.../reel/<code>/` links.
pub fn short_code_from_url(post_url: &str) -> Option<String> {
    let path = post_url.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    while let Some(segment) = segments.next() {
        if matches!(segment, "p" | "reel" | "reels" | "tv") {
            return segments
                .next()
                .filter(|code| code.len() <= MAX_SHORT_CODE_LEN)
                .map(str::to_string);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_handles() {
        assert_eq!(normalize_username("  @Shabra.Agency "), Some("shabra.agency".into()));
        assert_eq!(normalize_username("foo_bar9"), Some("foo_bar9".into()));
        assert_eq!(normalize_username("@"), None);
        assert_eq!(normalize_username("bad name"), None);
        assert_eq!(normalize_username(&"a".repeat(31)), None);
    }

    #[test]
    fn extracts_short_codes() {
        assert_eq!(
            short_code_from_url("https://instagram.com/p/abc"),
            Some("abc".to_string())
        );
        assert_eq!(
            short_code_from_url("https://www.instagram.com/reel/C1a2b3/?igsh=xyz"),
            Some("C1a2b3".to_string())
        );
        assert_eq!(short_code_from_url("https://www.instagram.com/foo/"), None);
    }

    #[test]
    fn accepts_only_http_urls() {
        assert!(is_http_url("https://instagram.com/p/abc"));
        assert!(!is_http_url("ftp://instagram.com/p/abc"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("https://insta gram.com"));
    }
}
