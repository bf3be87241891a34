use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Resolved links ---

/// One resolved server link: a display name and a directly playable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLink {
    pub name: String,
    pub url: String,
}

/// Ordered collection of server links for one quality.
///
/// Insertion order is the display/priority order. Inserting a name that
/// already exists overwrites its URL in place, keeping the original position;
/// new names append at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerSet {
    links: Vec<ServerLink>,
}

impl ServerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a link by name.
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        let url = url.into();
        match self.links.iter_mut().find(|l| l.name == name) {
            Some(existing) => existing.url = url,
            None => self.links.push(ServerLink { name, url }),
        }
    }

    /// Merge another set into this one. Same-named entries take the incoming
    /// URL; entries only present here are preserved.
    pub fn merge(&mut self, other: ServerSet) {
        for link in other.links {
            self.insert(link.name, link.url);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.url.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.links.iter().any(|l| l.name == name)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerLink> {
        self.links.iter()
    }

    pub fn into_links(self) -> Vec<ServerLink> {
        self.links
    }
}

impl FromIterator<(String, String)> for ServerSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = ServerSet::new();
        for (name, url) in iter {
            set.insert(name, url);
        }
        set
    }
}

/// Quality label → resolved server links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMap {
    qualities: BTreeMap<String, ServerSet>,
}

impl ServerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set stored for a quality.
    pub fn insert(&mut self, quality: impl Into<String>, servers: ServerSet) {
        self.qualities.insert(quality.into(), servers);
    }

    /// Deep merge: new qualities are inserted wholesale; existing qualities
    /// merge link-by-link with incoming entries overwriting same-named ones.
    pub fn merge(&mut self, incoming: ServerMap) {
        for (quality, servers) in incoming.qualities {
            match self.qualities.get_mut(&quality) {
                Some(existing) => existing.merge(servers),
                None => {
                    self.qualities.insert(quality, servers);
                }
            }
        }
    }

    pub fn get(&self, quality: &str) -> Option<&ServerSet> {
        self.qualities.get(quality)
    }

    /// Total number of links across all qualities.
    pub fn server_count(&self) -> usize {
        self.qualities.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.qualities.values().all(|s| s.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServerSet)> {
        self.qualities.iter()
    }
}

// --- Cache ---

/// One item's cached resolution result with its expiry window.
///
/// `expire_at` is always `updated_at + ttl` at the time of the last write.
/// An item with no write has no entry, never an entry with empty fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub links: ServerMap,
    pub updated_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

// --- Master data ---

/// Operator-managed media item: a stable id plus one master reference URL
/// per quality label. Master references are indirect and require extraction
/// to become playable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub master_refs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn insert_overwrites_in_place() {
        let mut set = ServerSet::new();
        set.insert("pixel", "http://a/1");
        set.insert("fsl", "http://a/2");
        set.insert("pixel", "http://a/3");

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("pixel"), Some("http://a/3"));
        // Overwriting keeps the original position
        let names: Vec<&str> = set.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["pixel", "fsl"]);
    }

    #[test]
    fn merge_accumulates_and_overwrites() {
        let mut a: ServerSet = [("x".to_string(), "u1".to_string())].into_iter().collect();
        let b: ServerSet = [
            ("x".to_string(), "u2".to_string()),
            ("y".to_string(), "u3".to_string()),
        ]
        .into_iter()
        .collect();

        a.merge(b);
        assert_eq!(a.get("x"), Some("u2"));
        assert_eq!(a.get("y"), Some("u3"));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn map_merge_is_deep() {
        let mut map = ServerMap::new();
        map.insert(
            "480",
            [("a".to_string(), "u1".to_string())].into_iter().collect(),
        );

        let mut incoming = ServerMap::new();
        incoming.insert(
            "480",
            [("b".to_string(), "u2".to_string())].into_iter().collect(),
        );
        incoming.insert(
            "720",
            [("c".to_string(), "u3".to_string())].into_iter().collect(),
        );

        map.merge(incoming);

        let q480 = map.get("480").unwrap();
        assert_eq!(q480.get("a"), Some("u1"));
        assert_eq!(q480.get("b"), Some("u2"));
        assert_eq!(map.get("720").unwrap().get("c"), Some("u3"));
        assert_eq!(map.server_count(), 3);
    }

    #[test]
    fn empty_quality_sets_do_not_count() {
        let mut map = ServerMap::new();
        map.insert("480", ServerSet::new());
        assert!(map.is_empty());
        assert_eq!(map.server_count(), 0);
    }

    #[test]
    fn entry_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry {
            links: ServerMap::new(),
            updated_at: now,
            expire_at: now + Duration::seconds(1),
        };

        assert!(!entry.is_expired(now));
        // expire_at itself counts as expired
        assert!(entry.is_expired(now + Duration::seconds(1)));
        assert!(entry.is_expired(now + Duration::seconds(2)));
    }
}
