/// Database configuration and connection management
pub mod database;

/// Subscription plan catalog seeding
pub mod plans;

/// Application and policy settings loaded from config.toml
pub mod settings;
