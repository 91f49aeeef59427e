//! Plugin descriptions as seen by the launcher
//!
//! The launcher never drives plugins itself. It only reads:
//! - the plugin id and kind
//! - its lifecycle status
//! - optional structured state (platform step results, position options)
//!   used to build progress and failure messages

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{PluginId, PluginKind, PluginStatus};

// ============================================================================
// Platform steps
// ============================================================================

/// Steps of the platform capability check, in the order they run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformStep {
    AvailabilityCheck,
    Authorization,
    UserGestureWait,
    FeatureInitialization,
    Finalization,
}

impl PlatformStep {
    pub const ORDER: [PlatformStep; 5] = [
        PlatformStep::AvailabilityCheck,
        PlatformStep::Authorization,
        PlatformStep::UserGestureWait,
        PlatformStep::FeatureInitialization,
        PlatformStep::Finalization,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            PlatformStep::AvailabilityCheck => "availability-check",
            PlatformStep::Authorization => "authorization",
            PlatformStep::UserGestureWait => "user-gesture-wait",
            PlatformStep::FeatureInitialization => "feature-initialization",
            PlatformStep::Finalization => "finalization",
        }
    }
}

/// Outcome of one platform step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// `None` until the step has run
    #[serde(default)]
    pub result: Option<bool>,
    /// Per-feature outcome, e.g. `web-audio: false`
    #[serde(default)]
    pub details: BTreeMap<String, bool>,
}

impl StepResult {
    pub fn passed() -> Self {
        Self {
            result: Some(true),
            details: BTreeMap::new(),
        }
    }

    pub fn failed<I, S>(failed_features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: Some(false),
            details: failed_features
                .into_iter()
                .map(|f| (f.into(), false))
                .collect(),
        }
    }
}

/// Which step failed first, and which of its features were negative
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureDetail {
    pub step: PlatformStep,
    pub failed_features: Vec<String>,
}

/// Results of the platform steps run so far
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformState {
    #[serde(default)]
    pub steps: BTreeMap<PlatformStep, StepResult>,
}

impl PlatformState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, step: PlatformStep, result: StepResult) {
        self.steps.insert(step, result);
    }

    pub fn result(&self, step: PlatformStep) -> Option<bool> {
        self.steps.get(&step).and_then(|s| s.result)
    }

    /// First step, in run order, whose result is not known yet
    pub fn current_step(&self) -> Option<PlatformStep> {
        PlatformStep::ORDER
            .into_iter()
            .find(|step| self.result(*step).is_none())
    }

    /// Earliest failing step. Later steps are never inspected once a
    /// negative result has been found.
    pub fn first_failure(&self) -> Option<FailureDetail> {
        for step in PlatformStep::ORDER {
            let Some(outcome) = self.steps.get(&step) else {
                continue;
            };

            if outcome.result == Some(false) {
                let failed_features = outcome
                    .details
                    .iter()
                    .filter(|(_, ok)| !**ok)
                    .map(|(feature, _)| feature.clone())
                    .collect();

                return Some(FailureDetail {
                    step,
                    failed_features,
                });
            }
        }

        None
    }
}

// ============================================================================
// Position
// ============================================================================

fn default_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Options of a position plugin (area the user picks a location in)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionOptions {
    #[serde(default = "default_range")]
    pub x_range: (f64, f64),
    #[serde(default = "default_range")]
    pub y_range: (f64, f64),
    #[serde(default)]
    pub background_image: Option<String>,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            x_range: default_range(),
            y_range: default_range(),
            background_image: None,
        }
    }
}

// ============================================================================
// Plugin info
// ============================================================================

/// Kind-specific state attached to a plugin
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PluginState {
    #[default]
    None,
    Platform(PlatformState),
    Position(PositionOptions),
}

/// Everything the launcher knows about one plugin
#[derive(Clone, Debug, PartialEq)]
pub struct PluginInfo {
    pub id: PluginId,
    pub kind: PluginKind,
    pub status: PluginStatus,
    pub state: PluginState,
}

impl PluginInfo {
    pub fn new(id: impl Into<PluginId>, kind: PluginKind) -> Self {
        let state = match kind {
            PluginKind::Platform => PluginState::Platform(PlatformState::new()),
            PluginKind::Position => PluginState::Position(PositionOptions::default()),
            _ => PluginState::None,
        };

        Self {
            id: id.into(),
            kind,
            status: PluginStatus::Idle,
            state,
        }
    }

    /// Fallback used when a plugin cannot be looked up: kind inferred from
    /// the id, no state
    pub fn bare(id: impl Into<PluginId>, status: PluginStatus) -> Self {
        let id = id.into();
        Self {
            kind: PluginKind::from_id(&id),
            id,
            status,
            state: PluginState::None,
        }
    }

    pub fn platform_state(&self) -> Option<&PlatformState> {
        match &self.state {
            PluginState::Platform(state) => Some(state),
            _ => None,
        }
    }

    pub fn position_options(&self) -> Option<&PositionOptions> {
        match &self.state {
            PluginState::Position(options) => Some(options),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_step_follows_run_order() {
        let mut state = PlatformState::new();
        assert_eq!(state.current_step(), Some(PlatformStep::AvailabilityCheck));

        state.set(PlatformStep::AvailabilityCheck, StepResult::passed());
        state.set(PlatformStep::Authorization, StepResult::passed());
        assert_eq!(state.current_step(), Some(PlatformStep::UserGestureWait));

        for step in PlatformStep::ORDER {
            state.set(step, StepResult::passed());
        }
        assert_eq!(state.current_step(), None);
    }

    #[test]
    fn test_first_failure_reports_earliest_step() {
        let mut state = PlatformState::new();
        state.set(PlatformStep::AvailabilityCheck, StepResult::passed());
        state.set(PlatformStep::Authorization, StepResult::failed(["microphone"]));
        state.set(
            PlatformStep::Finalization,
            StepResult::failed(["web-audio", "device-motion"]),
        );

        let failure = state.first_failure().unwrap();
        assert_eq!(failure.step, PlatformStep::Authorization);
        assert_eq!(failure.failed_features, vec!["microphone".to_string()]);
    }

    #[test]
    fn test_first_failure_only_lists_negative_features() {
        let mut state = PlatformState::new();
        let mut outcome = StepResult::failed(["web-audio"]);
        outcome.details.insert("device-motion".into(), true);
        state.set(PlatformStep::FeatureInitialization, outcome);

        let failure = state.first_failure().unwrap();
        assert_eq!(failure.step, PlatformStep::FeatureInitialization);
        assert_eq!(failure.failed_features, vec!["web-audio".to_string()]);
    }

    #[test]
    fn test_no_failure_without_negative_result() {
        let mut state = PlatformState::new();
        state.set(PlatformStep::AvailabilityCheck, StepResult::passed());
        assert_eq!(state.first_failure(), None);
    }

    #[test]
    fn test_bare_plugin_infers_kind() {
        let info = PluginInfo::bare("checkin", PluginStatus::Errored);
        assert_eq!(info.kind, PluginKind::Checkin);
        assert_eq!(info.state, PluginState::None);
        assert!(info.platform_state().is_none());
    }

    #[test]
    fn test_position_options_defaults_from_yaml() {
        let options: PositionOptions =
            serde_yaml::from_str("background_image: images/seating-map.png").unwrap();
        assert_eq!(options.x_range, (0.0, 1.0));
        assert_eq!(options.background_image.as_deref(), Some("images/seating-map.png"));
    }
}
