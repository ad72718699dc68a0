use std::env;
use std::str::FromStr;

use super::{ServerConfig, SynthesisPoolScope};

/// Read a variable, treating unset and blank values the same.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}").into()),
        None => Ok(None),
    }
}

/// Split a comma separated list, dropping blanks.
pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build a configuration from environment variables over defaults.
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_var("PORT")? {
        config.port = port;
    }

    config.openai_api_key = var("OPENAI_API_KEY");
    config.deepgram_api_key = var("DEEPGRAM_API_KEY");

    if let Some(provider) = var("LLM_PROVIDER") {
        config.llm_provider = provider;
    }
    if let Some(model) = var("LLM_MODEL") {
        config.llm_model = model;
    }
    config.llm_base_url = var("LLM_BASE_URL");
    if let Some(max_tokens) = parse_var("LLM_MAX_TOKENS")? {
        config.llm_max_tokens = max_tokens;
    }
    if let Some(temperature) = parse_var("LLM_TEMPERATURE")? {
        config.llm_temperature = temperature;
    }
    if let Some(prompt) = var("SYSTEM_PROMPT") {
        config.system_prompt = Some(prompt);
    }

    if let Some(provider) = var("TTS_PROVIDER") {
        config.tts_provider = provider;
    }
    if let Some(voice) = var("TTS_VOICE") {
        config.tts_voice = voice;
    }
    if let Some(model) = var("TTS_MODEL") {
        config.tts_model = model;
    }
    if let Some(format) = var("TTS_AUDIO_FORMAT") {
        config.tts_audio_format = format;
    }
    config.tts_speaking_rate = parse_var("TTS_SPEAKING_RATE")?;
    config.tts_endpoint = var("TTS_ENDPOINT");

    if let Some(k) = parse_var("SYNTHESIS_CONCURRENCY")? {
        config.synthesis_concurrency = k;
    }
    if let Some(scope) = var("SYNTHESIS_POOL_SCOPE") {
        config.synthesis_pool_scope = SynthesisPoolScope::parse(&scope)?;
    }
    if let Some(min) = parse_var("MIN_SENTENCE_CHARS")? {
        config.min_sentence_chars = min;
    }
    if let Some(list) = var("SENTENCE_ABBREVIATIONS") {
        config.abbreviations = parse_list(&list);
    }

    if let Some(max) = parse_var("MAX_HISTORY_MESSAGES")? {
        config.max_history_messages = max;
    }
    if let Some(secs) = parse_var("SESSION_IDLE_TIMEOUT_SECONDS")? {
        config.session_idle_timeout_seconds = secs;
    }
    if let Some(secs) = parse_var("SESSION_SWEEP_INTERVAL_SECONDS")? {
        config.session_sweep_interval_seconds = secs;
    }

    if let Some(provider) = var("STT_PROVIDER") {
        config.stt_provider = provider;
    }
    if let Some(model) = var("STT_MODEL") {
        config.stt_model = model;
    }
    if let Some(language) = var("STT_LANGUAGE") {
        config.stt_language = language;
    }
    if let Some(rate) = parse_var("STT_SAMPLE_RATE")? {
        config.stt_sample_rate = rate;
    }
    if let Some(secs) = parse_var("STT_CONNECT_TIMEOUT_SECONDS")? {
        config.stt_connect_timeout_seconds = secs;
    }

    Ok(config)
}
