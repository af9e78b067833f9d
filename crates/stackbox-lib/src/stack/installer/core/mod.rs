pub mod archive;
pub mod downloader;
pub mod fallback;
pub mod manual;
pub mod probe;
pub mod traits;
