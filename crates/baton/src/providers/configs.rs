/// Connection settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
}

impl OpenAiProviderConfig {
    pub fn new<H: Into<String>, K: Into<String>>(host: H, api_key: K) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 600,
        }
    }
}
