//! Per-unit fetch sessions
//!
//! Each worker and the discoverer own a `Session`: a fetcher with its own
//! connection pool and user agent plus a page extractor. Sessions are never
//! shared between units, and a restarted unit opens a fresh one.

use crate::config::Config;
use crate::crawler::extractor::{PageExtractor, SelectorExtractor};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::HarvestError;

/// A unit's private fetcher and extractor
pub struct Session {
    pub fetcher: Box<dyn Fetcher>,
    pub extractor: Box<dyn PageExtractor>,
}

impl Session {
    pub fn new(fetcher: Box<dyn Fetcher>, extractor: Box<dyn PageExtractor>) -> Self {
        Self { fetcher, extractor }
    }
}

/// Opens sessions for pipeline units
///
/// `slot` identifies the unit (worker id, or the worker count for the
/// discoverer) and may be used to vary identity between sessions.
pub trait SessionFactory: Send + Sync {
    fn open_session(&self, slot: usize) -> Result<Session, HarvestError>;
}

/// Builds HTTP sessions from the loaded configuration
pub struct HttpSessionFactory {
    config: Config,
}

impl HttpSessionFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open_session(&self, slot: usize) -> Result<Session, HarvestError> {
        let fetcher = HttpFetcher::new(&self.config.fetcher, slot).map_err(|e| {
            HarvestError::Session {
                slot,
                message: e.to_string(),
            }
        })?;
        let extractor = SelectorExtractor::new(&self.config.selectors)?;

        tracing::debug!("Opened HTTP session for slot {}", slot);
        Ok(Session::new(Box::new(fetcher), Box::new(extractor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_http_sessions() {
        let factory = HttpSessionFactory::new(Config::default());
        assert!(factory.open_session(0).is_ok());
        assert!(factory.open_session(7).is_ok());
    }

    #[test]
    fn test_bad_selector_fails_session() {
        let mut config = Config::default();
        config.selectors.item_link = "a[[".to_string();

        let factory = HttpSessionFactory::new(config);
        assert!(matches!(
            factory.open_session(0),
            Err(HarvestError::Config(_))
        ));
    }
}
