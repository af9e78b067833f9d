pub mod cache;
pub mod discovery;
pub mod sources;
pub mod types;

pub use cache::LocationCache;
pub use discovery::Discoverer;
pub use types::Candidate;
