pub mod settings;

pub use settings::StreamSettings;
