use clap::Parser;
use sdgen_core::{DeviceMap, LoadOptions, DEFAULT_MODEL_ID};

/// Command line arguments, each with an environment variable fallback.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Stable Diffusion image generation server")]
pub struct ServerConfig {
    /// Use CPU instead of GPU
    #[arg(long, env = "SDGEN_CPU")]
    pub cpu: bool,

    /// Keep weights in f32 even when a GPU is available
    #[arg(long, env = "SDGEN_USE_F32")]
    pub use_f32: bool,

    /// Hugging Face model identifier to load
    #[arg(long, env = "SDGEN_MODEL", default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    /// Host address to bind the server to
    #[arg(long, env = "SDGEN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "SDGEN_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "SDGEN_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            device_map: DeviceMap::from_cpu_flag(self.cpu),
            force_f32: self.use_f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "sdgen-server",
            "--cpu",
            "--model",
            "stabilityai/stable-diffusion-2-1",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .unwrap();
        assert_eq!(config.model, "stabilityai/stable-diffusion-2-1");
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.load_options().device_map, DeviceMap::ForceCpu);
        assert!(!config.load_options().force_f32);
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(ServerConfig::try_parse_from(["sdgen-server", "--port", "http"]).is_err());
    }
}
