//! The collaborator set a pipeline runs against, built once at startup.

use std::sync::Arc;

use realpress_core::AppConfig;

use crate::collaborators::{Extractor, Scorer};
use crate::extractor::HttpExtractor;
use crate::scorer::HttpScorer;

#[derive(Clone)]
pub struct Registry {
    pub extractor: Arc<dyn Extractor>,
    pub scorer: Arc<dyn Scorer>,
}

impl Registry {
    #[must_use]
    pub fn new(extractor: Arc<dyn Extractor>, scorer: Arc<dyn Scorer>) -> Self {
        Self { extractor, scorer }
    }

    /// Build the HTTP-backed extractor and scorer from application config.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if either HTTP client cannot be built.
    pub fn http(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let extractor = HttpExtractor::new(config.fetch_timeout_secs, &config.user_agent)?;
        let scorer = HttpScorer::new(
            &config.scorer_url,
            config.fetch_timeout_secs,
            &config.user_agent,
        )?;
        Ok(Self::new(Arc::new(extractor), Arc::new(scorer)))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
