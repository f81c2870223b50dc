//! Environment variable loading.
//!
//! Values are applied on top of defaults. Unset and blank variables leave
//! the current value untouched; unparsable values are errors.

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::realtime::{NoiseReduction, TranscriptionConfig};

/// Read a variable, treating blank values as unset.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse a variable.
pub(crate) fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::invalid_value(key, format!("'{raw}': {e}")))
        })
        .transpose()
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(crate) fn parse_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    env_var(key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid_value(
                key,
                format!("'{raw}' is not a boolean"),
            )),
        })
        .transpose()
}

/// Apply every recognised environment variable to `config`.
pub(crate) fn apply_env(config: &mut ServerConfig) -> Result<(), ConfigError> {
    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env::<u16>("PORT")? {
        config.port = port;
    }
    if let Some(debug) = parse_bool("DEBUG")? {
        config.debug = debug;
    }

    if parse_bool("TLS_ENABLED")?.unwrap_or(false) {
        let cert_path = env_var("TLS_CERT_PATH").ok_or_else(|| {
            ConfigError::Invalid("TLS_ENABLED is set but TLS_CERT_PATH is missing".to_string())
        })?;
        let key_path = env_var("TLS_KEY_PATH").ok_or_else(|| {
            ConfigError::Invalid("TLS_ENABLED is set but TLS_KEY_PATH is missing".to_string())
        })?;
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        });
    }

    if let Some(key) = env_var("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }

    apply_realtime_env(config)?;

    if let Some(origins) = env_var("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }
    if let Some(rps) = parse_env::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse_env::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    if let Some(max) = parse_env::<usize>("MAX_WEBSOCKET_CONNECTIONS")? {
        config.max_websocket_connections = Some(max);
    }
    if let Some(max) = parse_env::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = max;
    }

    Ok(())
}

fn apply_realtime_env(config: &mut ServerConfig) -> Result<(), ConfigError> {
    let realtime = &mut config.realtime;

    if let Some(url) = env_var("OPENAI_REALTIME_URL") {
        realtime.url = url;
    }
    if let Some(secs) = parse_env::<u64>("UPSTREAM_CONNECT_TIMEOUT_SECONDS")? {
        realtime.connect_timeout_seconds = secs;
    }
    if let Some(bytes) = parse_env::<usize>("MAX_AUDIO_CHUNK_BYTES")? {
        realtime.max_audio_chunk_bytes = bytes;
    }
    if let Some(ms) = parse_env::<u64>("AUDIO_COMPLETE_DELAY_MS")? {
        realtime.audio_complete_delay_ms = ms;
    }
    if let Some(secs) = parse_env::<u64>("RELAY_IDLE_TIMEOUT_SECONDS")? {
        realtime.idle_timeout_seconds = Some(secs);
    }

    let session = &mut realtime.session;
    if let Some(model) = env_var("OPENAI_REALTIME_MODEL") {
        session.model = model;
    }
    if let Some(voice) = env_var("OPENAI_REALTIME_VOICE") {
        session.voice = voice;
    }
    if let Some(instructions) = env_var("REALTIME_INSTRUCTIONS") {
        session.instructions = instructions;
    }

    if let Some(enabled) = parse_bool("VAD_ENABLED")? {
        session.vad.enabled = enabled;
    }
    if let Some(threshold) = parse_env::<f32>("VAD_THRESHOLD")? {
        session.vad.threshold = threshold;
    }
    if let Some(ms) = parse_env::<u32>("VAD_PREFIX_PADDING_MS")? {
        session.vad.prefix_padding_ms = ms;
    }
    if let Some(ms) = parse_env::<u32>("VAD_SILENCE_DURATION_MS")? {
        session.vad.silence_duration_ms = ms;
    }

    if parse_bool("TRANSCRIPTION_ENABLED")? == Some(false) {
        session.transcription = None;
    } else {
        let language = env_var("TRANSCRIPTION_LANGUAGE");
        let model = env_var("TRANSCRIPTION_MODEL");
        if language.is_some() || model.is_some() {
            let transcription = session
                .transcription
                .get_or_insert_with(TranscriptionConfig::default);
            if let Some(language) = language {
                transcription.language = language;
            }
            if let Some(model) = model {
                transcription.model = model;
            }
        }
    }

    if let Some(mode) = env_var("NOISE_REDUCTION") {
        session.noise_reduction = NoiseReduction::parse(&mode)
            .map_err(|reason| ConfigError::invalid_value("NOISE_REDUCTION", reason))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const KEYS: &[&str] = &[
        "PORT",
        "DEBUG",
        "TLS_ENABLED",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "VAD_ENABLED",
        "VAD_THRESHOLD",
        "TRANSCRIPTION_ENABLED",
        "TRANSCRIPTION_LANGUAGE",
        "NOISE_REDUCTION",
        "MAX_WEBSOCKET_CONNECTIONS",
        "RELAY_IDLE_TIMEOUT_SECONDS",
        "OPENAI_REALTIME_VOICE",
    ];

    fn cleanup() {
        unsafe {
            for key in KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_apply_env_overrides_defaults() {
        cleanup();
        unsafe {
            env::set_var("PORT", "9001");
            env::set_var("DEBUG", "yes");
            env::set_var("VAD_ENABLED", "false");
            env::set_var("VAD_THRESHOLD", "0.7");
            env::set_var("TRANSCRIPTION_LANGUAGE", "fr");
            env::set_var("NOISE_REDUCTION", "off");
            env::set_var("MAX_WEBSOCKET_CONNECTIONS", "25");
            env::set_var("RELAY_IDLE_TIMEOUT_SECONDS", "45");
            env::set_var("OPENAI_REALTIME_VOICE", "cedar");
        }

        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();

        assert_eq!(config.port, 9001);
        assert!(config.debug);
        assert!(!config.realtime.session.vad.enabled);
        assert_eq!(config.realtime.session.vad.threshold, 0.7);
        assert_eq!(
            config.realtime.session.transcription.as_ref().unwrap().language,
            "fr"
        );
        assert!(config.realtime.session.noise_reduction.is_none());
        assert_eq!(config.max_websocket_connections, Some(25));
        assert_eq!(config.realtime.idle_timeout_seconds, Some(45));
        assert_eq!(config.realtime.session.voice, "cedar");

        cleanup();
    }

    #[test]
    #[serial]
    fn test_transcription_can_be_disabled() {
        cleanup();
        unsafe {
            env::set_var("TRANSCRIPTION_ENABLED", "0");
        }

        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();
        assert!(config.realtime.session.transcription.is_none());

        cleanup();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_rejected() {
        cleanup();
        unsafe {
            env::set_var("PORT", "eighty");
        }

        let mut config = ServerConfig::default();
        let err = apply_env(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));

        cleanup();
    }

    #[test]
    #[serial]
    fn test_invalid_bool_and_noise_mode_rejected() {
        cleanup();
        unsafe {
            env::set_var("DEBUG", "maybe");
        }
        assert!(apply_env(&mut ServerConfig::default()).is_err());
        cleanup();

        unsafe {
            env::set_var("NOISE_REDUCTION", "studio");
        }
        assert!(apply_env(&mut ServerConfig::default()).is_err());
        cleanup();
    }

    #[test]
    #[serial]
    fn test_tls_requires_paths() {
        cleanup();
        unsafe {
            env::set_var("TLS_ENABLED", "true");
            env::set_var("TLS_CERT_PATH", "/etc/relay/cert.pem");
        }

        let result = apply_env(&mut ServerConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        unsafe {
            env::set_var("TLS_KEY_PATH", "/etc/relay/key.pem");
        }
        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/etc/relay/cert.pem"));
        assert_eq!(tls.key_path, PathBuf::from("/etc/relay/key.pem"));

        cleanup();
    }

    #[test]
    #[serial]
    fn test_blank_values_are_ignored() {
        cleanup();
        unsafe {
            env::set_var("PORT", "   ");
        }
        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();
        assert_eq!(config.port, 8000);
        cleanup();
    }
}
