use crate::stack::components::Component;
use crate::stack::metadata::types::Candidate;
use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::Client;

/// One upstream's discovery strategy.
/// Each component gets its own implementation so a changed upstream page or
/// API shape is handled in exactly one place.
pub trait ComponentSource: Send + Sync {
    fn component(&self) -> Component;

    /// Release API or HTML index, freshest first.
    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>>;

    /// Wider query, consulted only when `primary` yields nothing.
    fn secondary<'a>(&'a self, _client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Known-good versioned URLs. Never empty.
    fn fallback(&self) -> Vec<Candidate>;
}
