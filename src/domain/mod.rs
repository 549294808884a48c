pub mod error;
pub mod listener;
pub mod models;
pub mod settings;
