use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Serde already enforces the presence of the `library` and `fileshare`
/// sections; this checks values that would make a run meaningless.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    require_non_empty("library.url", &config.library.url)?;
    require_non_empty("library.api_key", &config.library.api_key)?;
    require_non_empty("fileshare.url", &config.fileshare.url)?;
    require_non_empty("fileshare.api_key", &config.fileshare.api_key)?;

    let search = &config.search;
    if search.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "search.page_size cannot be 0".to_string(),
        ));
    }
    if !(search.minimum_match_ratio > 0.0 && search.minimum_match_ratio <= 2.0) {
        return Err(ConfigError::ValidationError(format!(
            "search.minimum_match_ratio must be in (0, 2], got {}",
            search.minimum_match_ratio
        )));
    }
    if search.title_bonus < 0.0 {
        return Err(ConfigError::ValidationError(
            "search.title_bonus cannot be negative".to_string(),
        ));
    }
    if search.deadline_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.deadline_secs cannot be 0".to_string(),
        ));
    }

    let download = &config.download;
    if download.max_file_retries == 0 {
        return Err(ConfigError::ValidationError(
            "download.max_file_retries cannot be 0".to_string(),
        ));
    }
    if download.enqueue_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "download.enqueue_attempts cannot be 0".to_string(),
        ));
    }
    if download.rejected_retry_factor <= 0.0 {
        return Err(ConfigError::ValidationError(
            "download.rejected_retry_factor must be positive".to_string(),
        ));
    }

    if config.import.quarantine_dir_name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "import.quarantine_dir_name cannot be empty".to_string(),
        ));
    }
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts cannot be 0".to_string(),
        ));
    }

    Ok(())
}

fn require_non_empty(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{} cannot be empty", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[library]
url = "http://readarr:8787"
api_key = "abc"
download_dir = "/downloads"

[fileshare]
url = "http://slskd:5030"
api_key = "def"
download_dir = "/slskd/downloads"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_empty_api_key_fails() {
        let mut config = valid_config();
        config.fileshare.api_key = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("fileshare.api_key")));
    }

    #[test]
    fn test_validate_page_size_zero_fails() {
        let mut config = valid_config();
        config.search.page_size = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_ratio_out_of_range_fails() {
        let mut config = valid_config();
        config.search.minimum_match_ratio = 0.0;
        assert!(validate_config(&config).is_err());
        config.search.minimum_match_ratio = 2.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_retries_fails() {
        let mut config = valid_config();
        config.download.max_file_retries = 0;
        assert!(validate_config(&config).is_err());
    }
}
