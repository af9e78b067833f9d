pub mod components;
pub mod config;
pub mod database;
pub mod installer;
pub mod metadata;
pub mod paths;
