use url::Url;

use super::{types::Config, ConfigError, MAX_PAGE_SIZE};

/// Validate configuration
/// Currently validates:
/// - Commons URLs parse
/// - User agent is set (Wikimedia rejects anonymous clients)
/// - Page size is within the API limit
/// - Timeout is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let commons = &config.commons;

    for (key, value) in [
        ("commons.api_url", &commons.api_url),
        ("commons.site_url", &commons.site_url),
    ] {
        Url::parse(value).map_err(|e| {
            ConfigError::ValidationError(format!("{} is not a valid URL: {}", key, e))
        })?;
    }

    if commons.user_agent.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "commons.user_agent cannot be empty".to_string(),
        ));
    }

    if commons.page_size == 0 || commons.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "commons.page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    if commons.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "commons.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = Config::default();
        config.commons.page_size = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.commons.page_size = 501;
        assert!(validate_config(&config).is_err());

        config.commons.page_size = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent_fails() {
        let mut config = Config::default();
        config.commons.user_agent = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("user_agent"));
    }

    #[test]
    fn test_validate_bad_url_fails() {
        let mut config = Config::default();
        config.commons.api_url = "not a url".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("commons.api_url"));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.commons.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
