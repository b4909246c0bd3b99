pub mod ytdlp;

use async_trait::async_trait;

use crate::{audio::track::Track, error::ResolveError};

pub use ytdlp::YtDlpResolver;

/// Turns a free-text query or URL into downloaded tracks.
///
/// Implementations must finish downloading before returning, and return
/// either every track of the query or an error; never a partial list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, ResolveError>;
}
