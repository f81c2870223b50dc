use tracing::warn;
use url::Url;

use super::{ConfigError, ServerConfig};
use crate::core::realtime::OpenAIRealtimeVoice;

/// Validate the merged configuration.
pub(crate) fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_tls(config)?;
    validate_realtime(config)?;
    validate_limits(config)?;
    Ok(())
}

/// TLS files must exist when TLS is enabled.
pub(crate) fn validate_tls(config: &ServerConfig) -> Result<(), ConfigError> {
    let Some(tls) = &config.tls else {
        return Ok(());
    };

    if !tls.cert_path.exists() {
        return Err(ConfigError::Invalid(format!(
            "TLS certificate file not found: {}",
            tls.cert_path.display()
        )));
    }
    if !tls.key_path.exists() {
        return Err(ConfigError::Invalid(format!(
            "TLS private key file not found: {}",
            tls.key_path.display()
        )));
    }
    Ok(())
}

pub(crate) fn validate_realtime(config: &ServerConfig) -> Result<(), ConfigError> {
    let realtime = &config.realtime;

    let url = Url::parse(&realtime.url).map_err(|e| {
        ConfigError::invalid_value("realtime.url", format!("'{}': {e}", realtime.url))
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::invalid_value(
            "realtime.url",
            format!("scheme must be ws or wss, got '{}'", url.scheme()),
        ));
    }

    realtime.session.validate().map_err(ConfigError::Invalid)?;

    if OpenAIRealtimeVoice::parse(&realtime.session.voice).is_none() {
        warn!(
            voice = %realtime.session.voice,
            "Voice is not in the known voice list, passing it through unchanged"
        );
    }

    if realtime.connect_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "upstream connect timeout must be greater than zero".to_string(),
        ));
    }
    if realtime.max_audio_chunk_bytes == 0 {
        return Err(ConfigError::Invalid(
            "max audio chunk size must be greater than zero".to_string(),
        ));
    }
    if realtime.idle_timeout_seconds == Some(0) {
        return Err(ConfigError::Invalid(
            "relay idle timeout must be greater than zero when set".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_limits(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.rate_limit_requests_per_second == 0 {
        return Err(ConfigError::Invalid(
            "rate limit requests per second must be greater than zero".to_string(),
        ));
    }
    if config.rate_limit_burst_size == 0 {
        return Err(ConfigError::Invalid(
            "rate limit burst size must be greater than zero".to_string(),
        ));
    }
    if config.max_websocket_connections == Some(0) {
        return Err(ConfigError::Invalid(
            "max WebSocket connections must be greater than zero when set".to_string(),
        ));
    }
    if config.max_connections_per_ip == 0 {
        return Err(ConfigError::Invalid(
            "max connections per IP must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_server_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_tls_files_must_exist() {
        let mut config = ServerConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        });
        let err = validate_tls(&config).unwrap_err();
        assert!(err.to_string().contains("certificate file not found"));

        let temp_dir = TempDir::new().unwrap();
        let cert = temp_dir.path().join("cert.pem");
        let key = temp_dir.path().join("key.pem");
        fs::write(&cert, "cert").unwrap();
        fs::write(&key, "key").unwrap();
        config.tls = Some(TlsConfig {
            cert_path: cert,
            key_path: key,
        });
        assert!(validate_tls(&config).is_ok());
    }

    #[test]
    fn test_realtime_url_scheme() {
        let mut config = ServerConfig::default();
        config.realtime.url = "https://api.openai.com/v1/realtime".to_string();
        assert!(validate_realtime(&config).is_err());

        config.realtime.url = "ws://127.0.0.1:9000/v1/realtime".to_string();
        assert!(validate_realtime(&config).is_ok());

        config.realtime.url = "::nope::".to_string();
        assert!(validate_realtime(&config).is_err());
    }

    #[test]
    fn test_session_ranges() {
        let mut config = ServerConfig::default();
        config.realtime.session.output_speed = 2.0;
        assert!(matches!(
            validate_realtime(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_voice_is_allowed() {
        let mut config = ServerConfig::default();
        config.realtime.session.voice = "future-voice".to_string();
        assert!(validate_realtime(&config).is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = ServerConfig::default();
        config.realtime.max_audio_chunk_bytes = 0;
        assert!(validate_realtime(&config).is_err());

        let mut config = ServerConfig::default();
        config.realtime.idle_timeout_seconds = Some(0);
        assert!(validate_realtime(&config).is_err());

        let mut config = ServerConfig::default();
        config.max_websocket_connections = Some(0);
        assert!(validate_limits(&config).is_err());

        let mut config = ServerConfig::default();
        config.max_connections_per_ip = 0;
        assert!(validate_limits(&config).is_err());

        let mut config = ServerConfig::default();
        config.rate_limit_burst_size = 0;
        assert!(validate_limits(&config).is_err());
    }
}
