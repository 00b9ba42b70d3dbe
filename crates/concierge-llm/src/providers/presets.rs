/// Defaults for a named OpenAI-compatible provider.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name. `openai` itself has no preset.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "Concierge")],
        }),
        "mistral" => Some(ProviderPreset {
            default_base_url: "https://api.mistral.ai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Whether a provider can be called without an API key.
pub fn needs_api_key(provider: &str) -> bool {
    get_preset(provider).map(|p| p.needs_api_key).unwrap_or(true)
}
