//! Upstream provider configuration

use serde::{Deserialize, Serialize};

/// Settings for the OpenAI-compatible upstream the gateway proxies to.
///
/// The upstream API key is never placed in the config file itself; the file
/// names an environment variable and the key is read from there at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API, without a trailing slash
    pub base_url: String,
    /// Environment variable holding the upstream bearer token
    pub api_key_env: String,
    /// End-to-end timeout for one upstream call
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bothub.chat/api/v2/openai/v1".to_string(),
            api_key_env: "AIGATE_UPSTREAM_API_KEY".to_string(),
            timeout_seconds: 45,
        }
    }
}

impl UpstreamConfig {
    /// Read the upstream API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}
