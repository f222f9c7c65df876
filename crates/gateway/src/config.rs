use common::{env_opt, env_or};

pub use common::Environment;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_UPLOAD_MB: usize = 200;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub bind_addr: String,
    /// Request body limit for `/predict`, in bytes
    pub max_upload_bytes: usize,
    /// OTLP collector; telemetry export is off when `None`
    pub otel_endpoint: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let max_upload_mb = env_or("GATEWAY_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB);
        if max_upload_mb == 0 {
            anyhow::bail!("GATEWAY_MAX_UPLOAD_MB must be at least 1");
        }

        Ok(Self {
            environment: Environment::from_env(),
            bind_addr: env_opt("GATEWAY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            otel_endpoint: env_opt("GATEWAY_OTEL_ENDPOINT"),
        })
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: "127.0.0.1:0".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        unsafe {
            env::remove_var("GATEWAY_BIND_ADDR");
            env::remove_var("GATEWAY_MAX_UPLOAD_MB");
            env::remove_var("GATEWAY_OTEL_ENDPOINT");
        }

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
        assert!(config.otel_endpoint.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        unsafe {
            env::set_var("GATEWAY_BIND_ADDR", "127.0.0.1:9000");
            env::set_var("GATEWAY_MAX_UPLOAD_MB", "16");
            env::set_var("GATEWAY_OTEL_ENDPOINT", "http://collector:4317");
        }

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.otel_endpoint.as_deref(), Some("http://collector:4317"));

        unsafe { env::set_var("GATEWAY_MAX_UPLOAD_MB", "0") };
        assert!(GatewayConfig::from_env().is_err());

        unsafe {
            env::remove_var("GATEWAY_BIND_ADDR");
            env::remove_var("GATEWAY_MAX_UPLOAD_MB");
            env::remove_var("GATEWAY_OTEL_ENDPOINT");
        }
    }
}
