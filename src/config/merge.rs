use super::yaml::YamlConfig;
use super::{ServerConfig, SynthesisPoolScope};

/// Apply YAML values on top of an environment-loaded configuration.
///
/// Only fields present in the YAML file are overridden.
pub(crate) fn apply_yaml(
    config: &mut ServerConfig,
    yaml: YamlConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(providers) = yaml.providers {
        if providers.openai_api_key.is_some() {
            config.openai_api_key = providers.openai_api_key;
        }
        if providers.deepgram_api_key.is_some() {
            config.deepgram_api_key = providers.deepgram_api_key;
        }
    }

    if let Some(llm) = yaml.llm {
        if let Some(provider) = llm.provider {
            config.llm_provider = provider;
        }
        if let Some(model) = llm.model {
            config.llm_model = model;
        }
        if llm.base_url.is_some() {
            config.llm_base_url = llm.base_url;
        }
        if let Some(max_tokens) = llm.max_tokens {
            config.llm_max_tokens = max_tokens;
        }
        if let Some(temperature) = llm.temperature {
            config.llm_temperature = temperature;
        }
        if let Some(prompt) = llm.system_prompt {
            // An explicit empty prompt disables the system message
            config.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        }
    }

    if let Some(tts) = yaml.tts {
        if let Some(provider) = tts.provider {
            config.tts_provider = provider;
        }
        if let Some(voice) = tts.voice {
            config.tts_voice = voice;
        }
        if let Some(model) = tts.model {
            config.tts_model = model;
        }
        if let Some(format) = tts.audio_format {
            config.tts_audio_format = format;
        }
        if tts.speaking_rate.is_some() {
            config.tts_speaking_rate = tts.speaking_rate;
        }
        if tts.endpoint.is_some() {
            config.tts_endpoint = tts.endpoint;
        }
    }

    if let Some(pipeline) = yaml.pipeline {
        if let Some(k) = pipeline.synthesis_concurrency {
            config.synthesis_concurrency = k;
        }
        if let Some(scope) = pipeline.synthesis_pool_scope {
            config.synthesis_pool_scope = SynthesisPoolScope::parse(&scope)?;
        }
        if let Some(min) = pipeline.min_sentence_chars {
            config.min_sentence_chars = min;
        }
        if let Some(abbreviations) = pipeline.abbreviations {
            config.abbreviations = abbreviations;
        }
    }

    if let Some(session) = yaml.session {
        if let Some(max) = session.max_history_messages {
            config.max_history_messages = max;
        }
        if let Some(secs) = session.idle_timeout_seconds {
            config.session_idle_timeout_seconds = secs;
        }
        if let Some(secs) = session.sweep_interval_seconds {
            config.session_sweep_interval_seconds = secs;
        }
    }

    if let Some(stt) = yaml.stt {
        if let Some(provider) = stt.provider {
            config.stt_provider = provider;
        }
        if let Some(model) = stt.model {
            config.stt_model = model;
        }
        if let Some(language) = stt.language {
            config.stt_language = language;
        }
        if let Some(rate) = stt.sample_rate {
            config.stt_sample_rate = rate;
        }
        if let Some(secs) = stt.connect_timeout_seconds {
            config.stt_connect_timeout_seconds = secs;
        }
    }

    Ok(())
}
