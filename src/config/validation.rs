use super::ServerConfig;

/// Validate the merged configuration.
///
/// Missing API keys are not checked here; they surface when a session tries
/// to construct its providers.
pub(crate) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_server(config)?;
    validate_pipeline(config)?;
    validate_session(config)?;
    validate_llm(config)?;
    Ok(())
}

fn validate_server(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.port == 0 {
        return Err("PORT must be a non-zero port number".into());
    }
    if config.host.trim().is_empty() {
        return Err("HOST must not be empty".into());
    }
    Ok(())
}

fn validate_pipeline(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.synthesis_concurrency == 0 {
        return Err("SYNTHESIS_CONCURRENCY must be at least 1".into());
    }
    if config.stt_sample_rate == 0 {
        return Err("STT_SAMPLE_RATE must be greater than 0".into());
    }
    Ok(())
}

fn validate_session(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.max_history_messages == 0 || config.max_history_messages % 2 != 0 {
        return Err(format!(
            "MAX_HISTORY_MESSAGES must be a positive even number (got {})",
            config.max_history_messages
        )
        .into());
    }
    if config.session_idle_timeout_seconds == 0 {
        return Err("SESSION_IDLE_TIMEOUT_SECONDS must be greater than 0".into());
    }
    if config.session_sweep_interval_seconds == 0 {
        return Err("SESSION_SWEEP_INTERVAL_SECONDS must be greater than 0".into());
    }
    Ok(())
}

fn validate_llm(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=2.0).contains(&config.llm_temperature) {
        return Err(format!(
            "LLM_TEMPERATURE must be between 0.0 and 2.0 (got {})",
            config.llm_temperature
        )
        .into());
    }
    if config.llm_max_tokens == 0 {
        return Err("LLM_MAX_TOKENS must be greater than 0".into());
    }
    Ok(())
}
