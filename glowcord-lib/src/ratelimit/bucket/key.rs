use serde::{Deserialize, Serialize};
use std::fmt;

/// Strip leading and trailing slashes from an endpoint path.
///
/// `"/guilds/1/"`, `"guilds/1/"` and `"guilds/1"` all normalize to
/// `"guilds/1"`. A query string, if any, is kept after the trimmed path.
#[must_use]
pub fn normalize_endpoint(endpoint: &str) -> String {
    match endpoint.split_once('?') {
        Some((path, query)) => format!("{}?{query}", path.trim_matches('/')),
        None => endpoint.trim_matches('/').to_string(),
    }
}

/// A type-safe representation of a rate-limit route.
///
/// Two requests share a `RouteKey`, and therefore a bucket, iff their
/// normalized endpoint path and both major parameters (guild id and channel
/// id) match exactly. Query strings never take part in the key.
///
/// # Examples
///
/// ```
/// use glowcord_lib::ratelimit::RouteKey;
///
/// let a = RouteKey::new("/channels/42/messages/", None, Some("42"));
/// let b = RouteKey::new("channels/42/messages?limit=50", None, Some("42"));
/// assert_eq!(a, b);
/// assert_eq!(a.path(), "channels/42/messages");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    path: String,
    guild_id: Option<String>,
    channel_id: Option<String>,
}

impl RouteKey {
    /// Create a route key from an endpoint and its major parameters
    #[must_use]
    pub fn new(endpoint: &str, guild_id: Option<&str>, channel_id: Option<&str>) -> Self {
        let path = endpoint
            .split_once('?')
            .map_or(endpoint, |(path, _)| path)
            .trim_matches('/');

        Self {
            path: path.to_string(),
            guild_id: guild_id.map(str::to_string),
            channel_id: channel_id.map(str::to_string),
        }
    }

    /// The normalized endpoint path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The guild this route is scoped to, if any
    #[must_use]
    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    /// The channel this route is scoped to, if any
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    /// Whether this route is isolated by at least one major parameter.
    ///
    /// Routes without one share the path-only bucket of their endpoint.
    #[must_use]
    pub const fn has_major_parameter(&self) -> bool {
        self.guild_id.is_some() || self.channel_id.is_some()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        match (&self.guild_id, &self.channel_id) {
            (Some(guild), Some(channel)) => write!(f, " [guild {guild}, channel {channel}]"),
            (Some(guild), None) => write!(f, " [guild {guild}]"),
            (None, Some(channel)) => write!(f, " [channel {channel}]"),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/guilds/1/")]
    #[case("guilds/1/")]
    #[case("guilds/1")]
    #[case("//guilds/1//")]
    fn test_path_normalization(#[case] endpoint: &str) {
        let key = RouteKey::new(endpoint, Some("1"), None);
        assert_eq!(key, RouteKey::new("guilds/1", Some("1"), None));
        assert_eq!(key.path(), "guilds/1");
    }

    #[rstest]
    #[case("/gateway/", "gateway")]
    #[case("gateway", "gateway")]
    #[case("/channels/1/messages?limit=10", "channels/1/messages?limit=10")]
    #[case("/channels/1/messages/?limit=10", "channels/1/messages?limit=10")]
    #[case("/", "")]
    fn test_normalize_endpoint(#[case] endpoint: &str, #[case] expected: &str) {
        assert_eq!(normalize_endpoint(endpoint), expected);
    }

    #[test]
    fn test_major_parameters_separate_routes() {
        let guild = RouteKey::new("channels/1", Some("1"), None);
        let channel = RouteKey::new("channels/1", None, Some("1"));
        let both = RouteKey::new("channels/1", Some("1"), Some("1"));
        let none = RouteKey::new("channels/1", None, None);

        assert_ne!(guild, channel);
        assert_ne!(guild, both);
        assert_ne!(channel, both);
        assert_ne!(none, guild);

        assert!(guild.has_major_parameter());
        assert!(channel.has_major_parameter());
        assert!(!none.has_major_parameter());
    }

    #[test]
    fn test_query_is_not_part_of_key() {
        let a = RouteKey::new("channels/9/messages?limit=1", None, Some("9"));
        let b = RouteKey::new("channels/9/messages?before=3", None, Some("9"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_route_key_display() {
        assert_eq!(RouteKey::new("/gateway", None, None).to_string(), "gateway");
        assert_eq!(
            RouteKey::new("guilds/5/roles", Some("5"), None).to_string(),
            "guilds/5/roles [guild 5]"
        );
        assert_eq!(
            RouteKey::new("channels/7", Some("5"), Some("7")).to_string(),
            "channels/7 [guild 5, channel 7]"
        );
    }

    #[test]
    fn test_route_key_hash_equality() {
        use std::collections::HashMap;

        let key1 = RouteKey::new("/guilds/1/", Some("1"), None);
        let key2 = RouteKey::new("guilds/1", Some("1"), None);

        let mut map = HashMap::new();
        map.insert(key1, "value");

        assert_eq!(map.get(&key2), Some(&"value"));
    }
}
