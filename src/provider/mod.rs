//! Search provider abstraction
//!
//! The engine talks to the video platform only through [`SearchProvider`].
//! Every method takes the credential secret explicitly; the provider never
//! chooses credentials itself.
//!
//! - [`youtube`] - HTTP implementation against the YouTube Data API v3
//! - [`scripted`] - in-process implementation driven by canned responses,
//!   used by `extract --replay`

pub mod scripted;
pub mod youtube;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Candidate, Query, SearchPage};
use crate::utils::error::ProviderError;

pub use scripted::ScriptedProvider;
pub use youtube::YouTubeProvider;

/// Shared provider handle
pub type SharedSearchProvider = Arc<dyn SearchProvider>;

/// Video search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Fetch one page of item ids for `query`
    async fn search(
        &self,
        secret: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<SearchPage, ProviderError>;

    /// Fetch full metadata for `ids`
    ///
    /// Ids the provider does not know are simply absent from the result.
    async fn fetch_details(
        &self,
        secret: &str,
        ids: &[String],
    ) -> Result<Vec<Candidate>, ProviderError>;
}
