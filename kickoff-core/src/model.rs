use serde::{Deserialize, Serialize};

pub type PluginId = String;

/// Lifecycle status of a registered plugin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Idle,
    Inited,
    /// Initialization in progress
    Started,
    Errored,
}

impl PluginStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PluginStatus::Idle => "idle",
            PluginStatus::Inited => "inited",
            PluginStatus::Started => "started",
            PluginStatus::Errored => "errored",
        }
    }
}

/// The plugin "type", independent from the id it was registered under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    Platform,
    Position,
    Sync,
    AudioBufferLoader,
    Checkin,
    #[default]
    Generic,
}

impl PluginKind {
    /// Map a well-known plugin id to its kind, `Generic` otherwise
    pub fn from_id(id: &str) -> Self {
        match id {
            "platform" => PluginKind::Platform,
            "position" => PluginKind::Position,
            "sync" => PluginKind::Sync,
            "audio-buffer-loader" => PluginKind::AudioBufferLoader,
            "checkin" => PluginKind::Checkin,
            _ => PluginKind::Generic,
        }
    }

    pub fn requires_user_gesture(&self) -> bool {
        matches!(self, PluginKind::Platform)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PluginKind::Platform => "platform",
            PluginKind::Position => "position",
            PluginKind::Sync => "sync",
            PluginKind::AudioBufferLoader => "audio-buffer-loader",
            PluginKind::Checkin => "checkin",
            PluginKind::Generic => "generic",
        }
    }
}

/// Size of a render container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Registry state at one instant: plugin id -> status, in registration order.
///
/// Backed by a `Vec` rather than a map because the order is used to break
/// ties during screen selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    entries: Vec<(PluginId, PluginStatus)>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the status of `id` in place, or append it when new
    pub fn insert(&mut self, id: impl Into<PluginId>, status: PluginStatus) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, current)) => *current = status,
            None => self.entries.push((id, status)),
        }
    }

    pub fn get(&self, id: &str) -> Option<PluginStatus> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, status)| *status)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PluginStatus)> {
        self.entries.iter().map(|(id, status)| (id.as_str(), *status))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I: Into<PluginId>> FromIterator<(I, PluginStatus)> for StatusSnapshot {
    fn from_iter<T: IntoIterator<Item = (I, PluginStatus)>>(iter: T) -> Self {
        let mut snapshot = StatusSnapshot::new();
        for (id, status) in iter {
            snapshot.insert(id, status);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert("sync", PluginStatus::Idle);
        snapshot.insert("platform", PluginStatus::Idle);
        snapshot.insert("checkin", PluginStatus::Idle);

        // updating must not move the entry
        snapshot.insert("sync", PluginStatus::Started);

        assert_eq!(snapshot.ids(), vec!["sync", "platform", "checkin"]);
        assert_eq!(snapshot.get("sync"), Some(PluginStatus::Started));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_snapshot_missing_id() {
        let snapshot: StatusSnapshot = [("a", PluginStatus::Started)].into_iter().collect();
        assert!(snapshot.contains("a"));
        assert!(!snapshot.contains("b"));
        assert_eq!(snapshot.get("b"), None);
    }

    #[test]
    fn test_kind_from_id() {
        assert_eq!(PluginKind::from_id("platform"), PluginKind::Platform);
        assert_eq!(PluginKind::from_id("audio-buffer-loader"), PluginKind::AudioBufferLoader);
        assert_eq!(PluginKind::from_id("my-plugin"), PluginKind::Generic);
        assert!(PluginKind::Platform.requires_user_gesture());
        assert!(!PluginKind::Position.requires_user_gesture());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let yaml = serde_yaml::to_string(&PluginStatus::Errored).unwrap();
        assert_eq!(yaml.trim(), "errored");
        let kind: PluginKind = serde_yaml::from_str("audio-buffer-loader").unwrap();
        assert_eq!(kind, PluginKind::AudioBufferLoader);
    }
}
