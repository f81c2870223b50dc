use std::path::PathBuf;

use super::env::apply_env;
use super::yaml::{RealtimeYaml, YamlConfig};
use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::realtime::{AudioEncoding, NoiseReduction, TranscriptionConfig};

/// Build the final configuration: defaults, then environment, then YAML.
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();
    apply_env(&mut config)?;

    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }

    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> Result<(), ConfigError> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(debug) = server.debug {
            config.debug = debug;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let (Some(cert_path), Some(key_path)) = (tls.cert_path, tls.key_path) else {
                        return Err(ConfigError::Invalid(
                            "server.tls.enabled requires cert_path and key_path".to_string(),
                        ));
                    };
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert_path),
                        key_path: PathBuf::from(key_path),
                    });
                }
                None => {}
            }
        }
    }

    if let Some(providers) = yaml.providers {
        if let Some(key) = providers.openai_api_key {
            config.openai_api_key = Some(key);
        }
    }

    if let Some(realtime) = yaml.realtime {
        apply_realtime_yaml(config, realtime)?;
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = security.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if let Some(max) = security.max_websocket_connections {
            config.max_websocket_connections = Some(max);
        }
        if let Some(max) = security.max_connections_per_ip {
            config.max_connections_per_ip = max;
        }
    }

    Ok(())
}

fn apply_realtime_yaml(config: &mut ServerConfig, yaml: RealtimeYaml) -> Result<(), ConfigError> {
    let realtime = &mut config.realtime;

    if let Some(url) = yaml.url {
        realtime.url = url;
    }
    if let Some(secs) = yaml.connect_timeout_seconds {
        realtime.connect_timeout_seconds = secs;
    }
    if let Some(ms) = yaml.audio_complete_delay_ms {
        realtime.audio_complete_delay_ms = ms;
    }
    if let Some(bytes) = yaml.max_audio_chunk_bytes {
        realtime.max_audio_chunk_bytes = bytes;
    }
    if let Some(secs) = yaml.idle_timeout_seconds {
        realtime.idle_timeout_seconds = Some(secs);
    }

    let session = &mut realtime.session;
    if let Some(model) = yaml.model {
        session.model = model;
    }
    if let Some(voice) = yaml.voice {
        session.voice = voice;
    }
    if let Some(instructions) = yaml.instructions {
        session.instructions = instructions;
    }
    if let Some(speed) = yaml.speed {
        session.output_speed = speed;
    }
    if let Some(mode) = yaml.noise_reduction {
        session.noise_reduction = NoiseReduction::parse(&mode)
            .map_err(|reason| ConfigError::invalid_value("realtime.noise_reduction", reason))?;
    }
    if let Some(format) = yaml.audio_format {
        let encoding = AudioEncoding::parse(&format)
            .map_err(|reason| ConfigError::invalid_value("realtime.audio_format", reason))?;
        session.input_audio.encoding = encoding;
        session.output_audio.encoding = encoding;
    }
    if let Some(rate) = yaml.sample_rate {
        session.input_audio.sample_rate = rate;
        session.output_audio.sample_rate = rate;
    }

    if let Some(vad) = yaml.vad {
        if let Some(enabled) = vad.enabled {
            session.vad.enabled = enabled;
        }
        if let Some(create_response) = vad.create_response {
            session.vad.create_response = create_response;
        }
        if let Some(interrupt_response) = vad.interrupt_response {
            session.vad.interrupt_response = interrupt_response;
        }
        if let Some(threshold) = vad.threshold {
            session.vad.threshold = threshold;
        }
        if let Some(ms) = vad.prefix_padding_ms {
            session.vad.prefix_padding_ms = ms;
        }
        if let Some(ms) = vad.silence_duration_ms {
            session.vad.silence_duration_ms = ms;
        }
    }

    if let Some(transcription) = yaml.transcription {
        if transcription.enabled == Some(false) {
            session.transcription = None;
        } else {
            let target = session
                .transcription
                .get_or_insert_with(TranscriptionConfig::default);
            if let Some(language) = transcription.language {
                target.language = language;
            }
            if let Some(model) = transcription.model {
                target.model = model;
            }
        }
    }

    Ok(())
}
