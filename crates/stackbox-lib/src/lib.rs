//! Acquisition, normalization and configuration pipeline for a portable
//! Apache / PHP / MariaDB / Composer stack living in one relocatable directory.

pub mod stack;
pub mod utils;

pub use stack::components::Component;
pub use stack::config::params::ParameterSet;
pub use stack::paths::StackPaths;
