pub mod config;
pub mod model;
pub mod plugin;
pub mod registry;

// Screen selection and rendering
pub mod i18n;
pub mod messages;
pub mod selector;
pub mod view;

// Runtime drivers
pub mod controller;
pub mod orchestrator;
pub mod qos;
