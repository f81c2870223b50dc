use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. YAML values
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// providers:
///   openai_api_key: "sk-..."
///
/// realtime:
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-realtime"
///   voice: "alloy"
///   instructions: "You are a helpful AI assistant."
///   connect_timeout_seconds: 10
///   audio_complete_delay_ms: 500
///   max_audio_chunk_bytes: 1048576
///   idle_timeout_seconds: 300
///   speed: 1.0
///   noise_reduction: "near_field"
///   audio_format: "pcm"
///   sample_rate: 24000
///   vad:
///     enabled: true
///     create_response: true
///     interrupt_response: true
///     threshold: 0.5
///     prefix_padding_ms: 500
///     silence_duration_ms: 800
///   transcription:
///     enabled: true
///     language: "en"
///     model: "gpt-4o-transcribe"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: Option<bool>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,
}

/// Relay and session negotiation settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub audio_complete_delay_ms: Option<u64>,
    pub max_audio_chunk_bytes: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    /// Output speech speed (0.25 - 1.5)
    pub speed: Option<f32>,
    /// "near_field", "far_field" or "off"
    pub noise_reduction: Option<String>,
    /// "pcm", "pcmu" or "pcma", applied to both directions
    pub audio_format: Option<String>,
    pub sample_rate: Option<u32>,
    pub vad: Option<VadYaml>,
    pub transcription: Option<TranscriptionYaml>,
}

/// Server VAD settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub enabled: Option<bool>,
    pub create_response: Option<bool>,
    pub interrupt_response: Option<bool>,
    /// Activation threshold (0.0 - 1.0)
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

/// Input transcription settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranscriptionYaml {
    pub enabled: Option<bool>,
    pub language: Option<String>,
    pub model: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;

        Ok(config)
    }
}
