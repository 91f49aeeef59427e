//! Message templates
//!
//! Pure lookups from a plugin to the text shown for it. Dispatch is on the
//! kind derived from the plugin id, with a generic fallback.

use crate::i18n::LanguageData;
use crate::model::PluginKind;
use crate::plugin::{PlatformState, PlatformStep, PluginInfo};

/// Two-line error text of the errored screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
    pub message: String,
    pub description: String,
}

/// Progress line of the platform screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformProgress {
    pub message: String,
    pub blink: bool,
    /// The platform waits for a user gesture to go on
    pub awaiting_gesture: bool,
}

fn interpolate(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

/// Line listed on the default screen for a started plugin
pub fn pending_message(plugin: &PluginInfo, texts: &LanguageData) -> String {
    match PluginKind::from_id(&plugin.id) {
        PluginKind::Sync => texts.pending.sync.clone(),
        PluginKind::AudioBufferLoader => texts.pending.audio_buffer_loader.clone(),
        PluginKind::Platform | PluginKind::Position | PluginKind::Checkin | PluginKind::Generic => {
            interpolate(&texts.pending.generic, &plugin.id)
        }
    }
}

pub fn step_error_label(step: PlatformStep, texts: &LanguageData) -> &str {
    let errors = &texts.platform.errors;
    match step {
        PlatformStep::AvailabilityCheck => &errors.availability_check,
        PlatformStep::Authorization => &errors.authorization,
        PlatformStep::UserGestureWait => &errors.user_gesture_wait,
        PlatformStep::FeatureInitialization => &errors.feature_initialization,
        PlatformStep::Finalization => &errors.finalization,
    }
}

pub fn error_message(plugin: &PluginInfo, texts: &LanguageData) -> ErrorMessage {
    let generic = || ErrorMessage {
        message: texts.common.error_title.clone(),
        description: interpolate(&texts.errored.description, &plugin.id),
    };

    match PluginKind::from_id(&plugin.id) {
        PluginKind::Platform => {
            let failure = plugin.platform_state().and_then(PlatformState::first_failure);
            match failure {
                Some(failure) => ErrorMessage {
                    message: texts.common.error_title.clone(),
                    description: format!(
                        "{} ({})",
                        step_error_label(failure.step, texts),
                        failure.failed_features.join(", ")
                    ),
                },
                None => generic(),
            }
        }
        PluginKind::Checkin => ErrorMessage {
            message: texts.checkin.message.clone(),
            description: texts.checkin.description.clone(),
        },
        PluginKind::Position | PluginKind::Sync | PluginKind::AudioBufferLoader | PluginKind::Generic => {
            generic()
        }
    }
}

/// Progress of a started platform plugin.
///
/// A failed step ends the inspection: its error label is reported instead of
/// the progress of later steps. `None` once every step has completed.
pub fn platform_progress(state: &PlatformState, texts: &LanguageData) -> Option<PlatformProgress> {
    let platform = &texts.platform;

    for step in PlatformStep::ORDER {
        match state.result(step) {
            Some(true) => continue,
            Some(false) => {
                return Some(PlatformProgress {
                    message: step_error_label(step, texts).to_string(),
                    blink: false,
                    awaiting_gesture: false,
                });
            }
            None => {
                let (message, waiting) = match step {
                    PlatformStep::AvailabilityCheck => (&platform.checking, false),
                    PlatformStep::Authorization => (&platform.authorizing, false),
                    PlatformStep::UserGestureWait => (&platform.click_to_join, true),
                    PlatformStep::FeatureInitialization => (&platform.initializing, false),
                    PlatformStep::Finalization => (&platform.finalizing, false),
                };

                return Some(PlatformProgress {
                    message: message.clone(),
                    blink: waiting,
                    awaiting_gesture: waiting,
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Languages;
    use crate::model::PluginStatus;
    use crate::plugin::{PluginState, StepResult};

    fn en() -> LanguageData {
        Languages::builtin().unwrap().language_data("en").unwrap().clone()
    }

    #[test]
    fn test_pending_messages() {
        let texts = en();
        let sync = PluginInfo::new("sync", PluginKind::Sync);
        let loader = PluginInfo::new("audio-buffer-loader", PluginKind::AudioBufferLoader);
        let custom = PluginInfo::new("scripts", PluginKind::Generic);

        assert_eq!(pending_message(&sync, &texts), "Syncing");
        assert_eq!(pending_message(&loader, &texts), "Loading audio files");
        assert_eq!(pending_message(&custom, &texts), "Initializing scripts");
    }

    #[test]
    fn test_platform_error_reports_first_failed_step() {
        let texts = en();
        let mut platform = PluginInfo::new("platform", PluginKind::Platform);
        platform.status = PluginStatus::Errored;
        if let PluginState::Platform(state) = &mut platform.state {
            state.set(PlatformStep::AvailabilityCheck, StepResult::failed(["web-audio", "device-motion"]));
            state.set(PlatformStep::Finalization, StepResult::failed(["audio-context"]));
        }

        let msg = error_message(&platform, &texts);
        assert_eq!(msg.message, "An error occured while...");
        assert_eq!(
            msg.description,
            "checking device compatibility (device-motion, web-audio)"
        );
    }

    #[test]
    fn test_platform_error_without_detail() {
        let texts = en();
        let platform = PluginInfo::bare("platform", PluginStatus::Errored);
        let msg = error_message(&platform, &texts);
        assert_eq!(msg.description, "Initializing platform");
    }

    #[test]
    fn test_checkin_and_generic_errors() {
        let texts = en();
        let checkin = error_message(&PluginInfo::bare("checkin", PluginStatus::Errored), &texts);
        assert_eq!(checkin.message, "No place available...");
        assert_eq!(checkin.description, "Please try again later");

        let other = error_message(&PluginInfo::bare("c", PluginStatus::Errored), &texts);
        assert_eq!(other.message, "An error occured while...");
        assert_eq!(other.description, "Initializing c");
    }

    #[test]
    fn test_platform_progress_steps() {
        let texts = en();
        let mut state = PlatformState::new();
        assert_eq!(platform_progress(&state, &texts).unwrap().message, "Checking...");

        state.set(PlatformStep::AvailabilityCheck, StepResult::passed());
        state.set(PlatformStep::Authorization, StepResult::passed());
        let progress = platform_progress(&state, &texts).unwrap();
        assert_eq!(progress.message, "Please click to join");
        assert!(progress.blink);
        assert!(progress.awaiting_gesture);

        state.set(PlatformStep::UserGestureWait, StepResult::passed());
        assert_eq!(platform_progress(&state, &texts).unwrap().message, "Initializing...");

        state.set(PlatformStep::FeatureInitialization, StepResult::passed());
        state.set(PlatformStep::Finalization, StepResult::passed());
        assert_eq!(platform_progress(&state, &texts), None);
    }

    #[test]
    fn test_platform_progress_stops_at_failure() {
        let texts = en();
        let mut state = PlatformState::new();
        state.set(PlatformStep::AvailabilityCheck, StepResult::failed(["web-audio"]));
        let progress = platform_progress(&state, &texts).unwrap();
        assert_eq!(progress.message, "checking device compatibility");
        assert!(!progress.awaiting_gesture);
    }
}
