use kickoff_core::config::ConfigError;
use kickoff_core::i18n::LanguageError;
use kickoff_core::orchestrator::LaunchError;
use kickoff_core::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Language(#[from] LanguageError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to spawn client {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
