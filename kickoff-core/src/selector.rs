//! Screen selection
//!
//! Maps a [`StatusSnapshot`] to the screen that should be shown while the
//! client initializes. Selection is a pure function of the snapshot, the
//! plugin lookup and the viewport: same inputs, same descriptor.

use serde::{Deserialize, Serialize};

use crate::model::{PluginStatus, StatusSnapshot, Viewport};
use crate::plugin::PluginInfo;
use crate::registry::PluginLookup;

pub const PLATFORM_ID: &str = "platform";
pub const POSITION_ID: &str = "position";

/// Screen to present, with the plugin(s) needed to paint it
#[derive(Clone, Debug, PartialEq)]
pub enum ScreenDescriptor {
    Platform {
        plugin: PluginInfo,
        viewport: Viewport,
    },
    Position {
        plugin: PluginInfo,
        viewport: Viewport,
    },
    Default {
        pending: Vec<PluginInfo>,
        viewport: Viewport,
    },
    Errored {
        plugin: PluginInfo,
        viewport: Viewport,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScreenKind {
    Platform,
    Position,
    Default,
    Errored,
}

impl ScreenKind {
    pub fn label(&self) -> &'static str {
        match self {
            ScreenKind::Platform => "platform",
            ScreenKind::Position => "position",
            ScreenKind::Default => "default",
            ScreenKind::Errored => "errored",
        }
    }
}

impl ScreenDescriptor {
    pub fn kind(&self) -> ScreenKind {
        match self {
            ScreenDescriptor::Platform { .. } => ScreenKind::Platform,
            ScreenDescriptor::Position { .. } => ScreenKind::Position,
            ScreenDescriptor::Default { .. } => ScreenKind::Default,
            ScreenDescriptor::Errored { .. } => ScreenKind::Errored,
        }
    }

    pub fn viewport(&self) -> Viewport {
        match self {
            ScreenDescriptor::Platform { viewport, .. }
            | ScreenDescriptor::Position { viewport, .. }
            | ScreenDescriptor::Default { viewport, .. }
            | ScreenDescriptor::Errored { viewport, .. } => *viewport,
        }
    }

    /// Ids of the plugins this screen is about, for logging
    pub fn plugin_ids(&self) -> Vec<&str> {
        match self {
            ScreenDescriptor::Platform { plugin, .. }
            | ScreenDescriptor::Position { plugin, .. }
            | ScreenDescriptor::Errored { plugin, .. } => vec![plugin.id.as_str()],
            ScreenDescriptor::Default { pending, .. } => {
                pending.iter().map(|p| p.id.as_str()).collect()
            }
        }
    }
}

/// Which errored plugin wins when several are errored at once
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Earliest in registration order
    #[default]
    FirstFound,
    /// Latest in registration order
    LastFound,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenSelector {
    pub error_policy: ErrorPolicy,
}

impl ScreenSelector {
    pub fn new(error_policy: ErrorPolicy) -> Self {
        Self { error_policy }
    }

    pub fn select<L>(&self, snapshot: &StatusSnapshot, lookup: &L, viewport: Viewport) -> ScreenDescriptor
    where
        L: PluginLookup + ?Sized,
    {
        let resolve = |id: &str, status: PluginStatus| {
            lookup.plugin(id).unwrap_or_else(|err| {
                tracing::debug!(plugin = %id, error = %err, "plugin lookup failed, using bare info");
                PluginInfo::bare(id, status)
            })
        };

        match snapshot.get(PLATFORM_ID) {
            Some(PluginStatus::Started) => {
                return ScreenDescriptor::Platform {
                    plugin: resolve(PLATFORM_ID, PluginStatus::Started),
                    viewport,
                };
            }
            Some(PluginStatus::Errored) => {
                return ScreenDescriptor::Errored {
                    plugin: resolve(PLATFORM_ID, PluginStatus::Errored),
                    viewport,
                };
            }
            _ => {}
        }

        if snapshot.get(POSITION_ID) == Some(PluginStatus::Started) {
            return ScreenDescriptor::Position {
                plugin: resolve(POSITION_ID, PluginStatus::Started),
                viewport,
            };
        }

        let mut pending = Vec::new();
        let mut errored: Option<&str> = None;

        for (id, status) in snapshot.iter() {
            match status {
                PluginStatus::Started => pending.push(resolve(id, status)),
                PluginStatus::Errored => match self.error_policy {
                    ErrorPolicy::FirstFound => {
                        errored.get_or_insert(id);
                    }
                    ErrorPolicy::LastFound => errored = Some(id),
                },
                // idle and inited plugins are not shown
                PluginStatus::Idle | PluginStatus::Inited => {}
            }
        }

        match errored {
            Some(id) => ScreenDescriptor::Errored {
                plugin: resolve(id, PluginStatus::Errored),
                viewport,
            },
            None => ScreenDescriptor::Default { pending, viewport },
        }
    }
}

/// Select with the default error policy
pub fn select<L>(snapshot: &StatusSnapshot, lookup: &L, viewport: Viewport) -> ScreenDescriptor
where
    L: PluginLookup + ?Sized,
{
    ScreenSelector::default().select(snapshot, lookup, viewport)
}
