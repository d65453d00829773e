// Settings module
// User configuration persisted as JSON in the data directory

pub mod settings;

pub use settings::{AppSettings, NetworkSettings, PlaybackSettings};
