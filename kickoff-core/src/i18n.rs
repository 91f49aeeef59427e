//! Localized texts of the initialization screens
//!
//! English and French tables are embedded at build time. Callers can add or
//! replace tables with [`Languages::set_language_data`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "en";

const BUILTIN: [(&str, &str); 2] = [
    ("en", include_str!("../i18n/en.yaml")),
    ("fr", include_str!("../i18n/fr.yaml")),
];

#[derive(Debug, thiserror::Error)]
pub enum LanguageError {
    #[error("no language data available for \"{lang}\"")]
    UnknownLanguage { lang: String },
    #[error("invalid language data for \"{lang}\": {source}")]
    Parse {
        lang: String,
        #[source]
        source: serde_yaml::Error,
    },
}

// ============================================================================
// Language data
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonTexts {
    pub error_title: String,
    pub start_all: String,
    pub ready: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTexts {
    pub sync: String,
    pub audio_buffer_loader: String,
    /// `{id}` is replaced by the plugin id
    pub generic: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepErrorTexts {
    pub availability_check: String,
    pub authorization: String,
    pub user_gesture_wait: String,
    pub feature_initialization: String,
    pub finalization: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTexts {
    pub checking: String,
    pub authorizing: String,
    pub click_to_join: String,
    pub initializing: String,
    pub finalizing: String,
    pub errors: StepErrorTexts,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTexts {
    pub prompt: String,
    pub send: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTexts {
    pub message: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErroredTexts {
    /// `{id}` is replaced by the plugin id
    pub description: String,
}

/// Every text the initialization screens need, for one language
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageData {
    pub common: CommonTexts,
    pub pending: PendingTexts,
    pub platform: PlatformTexts,
    pub position: PositionTexts,
    pub checkin: MessageTexts,
    pub errored: ErroredTexts,
}

impl LanguageData {
    pub fn from_yaml(lang: &str, content: &str) -> Result<Self, LanguageError> {
        serde_yaml::from_str(content).map_err(|source| LanguageError::Parse {
            lang: lang.to_string(),
            source,
        })
    }
}

// ============================================================================
// Languages
// ============================================================================

/// Language tables plus the selected language
#[derive(Clone, Debug)]
pub struct Languages {
    language: Option<String>,
    data: BTreeMap<String, LanguageData>,
}

impl Languages {
    /// Tables for the embedded languages, no language selected yet
    pub fn builtin() -> Result<Self, LanguageError> {
        let mut data = BTreeMap::new();
        for (lang, content) in BUILTIN {
            data.insert(lang.to_string(), LanguageData::from_yaml(lang, content)?);
        }

        Ok(Self {
            language: None,
            data,
        })
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, lang: &str) -> Result<(), LanguageError> {
        if !self.data.contains_key(lang) {
            return Err(LanguageError::UnknownLanguage {
                lang: lang.to_string(),
            });
        }

        self.language = Some(lang.to_string());
        Ok(())
    }

    pub fn set_language_data(&mut self, lang: impl Into<String>, data: LanguageData) {
        self.data.insert(lang.into(), data);
    }

    pub fn language_data(&self, lang: &str) -> Result<&LanguageData, LanguageError> {
        self.data
            .get(lang)
            .ok_or_else(|| LanguageError::UnknownLanguage {
                lang: lang.to_string(),
            })
    }

    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Pick a language when none was set explicitly.
    ///
    /// Only the primary subtag of `locale_hint` is considered (`fr-CA`,
    /// `fr_FR.UTF-8` -> `fr`). Unsupported or missing hints fall back to
    /// [`DEFAULT_LANGUAGE`].
    pub fn resolve(&mut self, locale_hint: Option<&str>) -> &str {
        if self.language.is_none() {
            let primary = locale_hint
                .and_then(|hint| hint.split(['-', '_', '.']).next())
                .map(|tag| tag.trim().to_ascii_lowercase())
                .filter(|tag| self.data.contains_key(tag));

            let lang = primary.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
            tracing::debug!(lang = %lang, hint = ?locale_hint, "language resolved");
            self.language = Some(lang);
        }

        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Texts of the selected language, or of the default one
    pub fn current(&self) -> Result<&LanguageData, LanguageError> {
        self.language_data(self.language().unwrap_or(DEFAULT_LANGUAGE))
    }
}
