use crate::config::types::{
    Config, CrawlConfig, FetcherConfig, PipelineConfig, SelectorConfig, WriterConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_writer_config(&config.writer)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_selectors(&config.selectors)?;
    Ok(())
}

/// Validates seed URLs
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    for seed in &config.seeds {
        validate_seed(seed)?;
    }
    Ok(())
}

/// Validates a single seed URL: must parse and use http(s)
pub fn validate_seed(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            seed
        )));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.quiescence_polls < 1 {
        return Err(ConfigError::Validation(
            "quiescence-polls must be >= 1".to_string(),
        ));
    }

    if config.pop_timeout_ms == 0 || config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "pop-timeout-ms and poll-interval-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_writer_config(config: &WriterConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.idle_flush_ms == 0 {
        return Err(ConfigError::Validation(
            "idle-flush-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be > 0".to_string(),
        ));
    }

    if let Some(status) = config
        .retry_statuses
        .iter()
        .find(|s| !(100..=599).contains(*s))
    {
        return Err(ConfigError::Validation(format!(
            "retry-statuses contains invalid HTTP status {}",
            status
        )));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;
    }

    Ok(())
}

fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    let mut selectors = vec![
        ("heading", &config.heading),
        ("subcategory-link", &config.subcategory_link),
        ("item-link", &config.item_link),
        ("pagination", &config.pagination),
        ("description", &config.description),
        ("price-median", &config.price_median),
        ("price-range", &config.price_range),
    ];
    if let Some(availability) = &config.availability {
        selectors.push(("availability", availability));
    }

    for (field, selector) in selectors {
        Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
            field,
            selector: selector.clone(),
        })?;
    }

    Ok(())
}
