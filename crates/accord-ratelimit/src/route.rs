//! Route keys and global-limit exemptions.
//!
//! Discord scopes route limits by method, path template and the "major
//! parameter" (the channel, guild or webhook id that leads the path).
//! Other snowflakes and tokens are collapsed so that, for example, every
//! message id under one channel shares a key.

use reqwest::Method;

/// Resources whose id is a major parameter when it leads the path.
const MAJOR_RESOURCES: &[&str] = &["channels", "guilds", "webhooks"];

/// Build the route key for a request: `"{METHOD} {template}"`.
///
/// The query string is ignored.
#[must_use]
pub fn route_key(method: &Method, path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut template = String::with_capacity(path.len());
    for (index, &segment) in segments.iter().enumerate() {
        let previous = index.checked_sub(1).and_then(|i| segments.get(i)).copied();
        let normalized = match previous {
            Some(resource) if index == 1 && MAJOR_RESOURCES.contains(&resource) => segment,
            Some("reactions") => "{emoji}",
            _ if is_token_segment(&segments, index) => "{token}",
            _ if is_snowflake(segment) => "{id}",
            _ => segment,
        };
        template.push('/');
        template.push_str(normalized);
    }
    if template.is_empty() {
        template.push('/');
    }
    format!("{method} {template}")
}

/// Whether a request path is exempt from the global per-token limit.
///
/// Interaction callbacks and interaction/webhook token routes are not
/// counted against it.
#[must_use]
pub fn is_global_exempt(path: &str) -> bool {
    let mut segments = path
        .split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty());
    match segments.next() {
        Some("interactions") => true,
        Some("webhooks") => segments.nth(1).is_some(),
        _ => false,
    }
}

/// The segment after `/webhooks/{id}/` or `/interactions/{id}/`.
fn is_token_segment(segments: &[&str], index: usize) -> bool {
    index == 2
        && matches!(segments.first(), Some(&"webhooks" | &"interactions"))
        && !is_snowflake(segments.get(index).copied().unwrap_or_default())
}

fn is_snowflake(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_major_parameter() {
        assert_eq!(
            route_key(&Method::POST, "/channels/123/messages"),
            "POST /channels/123/messages"
        );
        assert_eq!(
            route_key(&Method::GET, "/guilds/42/members/77"),
            "GET /guilds/42/members/{id}"
        );
    }

    #[test]
    fn collapses_minor_ids() {
        let a = route_key(&Method::PATCH, "/channels/123/messages/1");
        let b = route_key(&Method::PATCH, "/channels/123/messages/2");
        assert_eq!(a, b);
        assert_eq!(a, "PATCH /channels/123/messages/{id}");
    }

    #[test]
    fn different_channels_differ() {
        assert_ne!(
            route_key(&Method::POST, "/channels/1/messages"),
            route_key(&Method::POST, "/channels/2/messages")
        );
    }

    #[test]
    fn method_is_part_of_key() {
        assert_ne!(
            route_key(&Method::GET, "/channels/1/messages"),
            route_key(&Method::POST, "/channels/1/messages")
        );
    }

    #[test]
    fn collapses_tokens_and_emoji() {
        assert_eq!(
            route_key(&Method::POST, "/interactions/99/aW50ZXJhY3Rpb24/callback"),
            "POST /interactions/{id}/{token}/callback"
        );
        assert_eq!(
            route_key(&Method::POST, "/webhooks/5/tok_en"),
            "POST /webhooks/5/{token}"
        );
        assert_eq!(
            route_key(&Method::PUT, "/channels/1/messages/2/reactions/%F0%9F%91%8D/@me"),
            "PUT /channels/1/messages/{id}/reactions/{emoji}/@me"
        );
    }

    #[test]
    fn ignores_query_and_handles_root() {
        assert_eq!(
            route_key(&Method::GET, "/guilds/1/audit-logs?limit=5"),
            "GET /guilds/1/audit-logs"
        );
        assert_eq!(route_key(&Method::GET, "/"), "GET /");
        assert_eq!(route_key(&Method::GET, "/gateway/bot"), "GET /gateway/bot");
    }

    #[test]
    fn global_exemptions() {
        assert!(is_global_exempt("/interactions/1/tok/callback"));
        assert!(is_global_exempt("/webhooks/1/tok"));
        assert!(is_global_exempt("/webhooks/1/tok/messages/@original"));
        assert!(!is_global_exempt("/webhooks/1"));
        assert!(!is_global_exempt("/channels/1/messages"));
        assert!(!is_global_exempt("/"));
    }
}
