use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Read `key` and parse it, falling back to `default` when unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read `key` as a string. Empty values count as unset.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_environment_from_env() {
        unsafe { env::set_var("ENVIRONMENT", "PROD") };
        assert_eq!(Environment::from_env(), Environment::Production);

        unsafe { env::set_var("ENVIRONMENT", "staging") };
        assert_eq!(Environment::from_env(), Environment::Development);

        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn test_env_or_falls_back_on_garbage() {
        unsafe { env::set_var("COMMON_TEST_PORT", "not-a-number") };
        assert_eq!(env_or("COMMON_TEST_PORT", 8000u16), 8000);

        unsafe { env::set_var("COMMON_TEST_PORT", " 9000 ") };
        assert_eq!(env_or("COMMON_TEST_PORT", 8000u16), 9000);

        unsafe { env::remove_var("COMMON_TEST_PORT") };
        assert_eq!(env_or("COMMON_TEST_PORT", 0.25f32), 0.25);
    }

    #[test]
    #[serial]
    fn test_env_opt_treats_empty_as_unset() {
        unsafe { env::set_var("COMMON_TEST_PATH", "   ") };
        assert_eq!(env_opt("COMMON_TEST_PATH"), None);

        unsafe { env::set_var("COMMON_TEST_PATH", "/models/a.onnx") };
        assert_eq!(env_opt("COMMON_TEST_PATH").as_deref(), Some("/models/a.onnx"));

        unsafe { env::remove_var("COMMON_TEST_PATH") };
    }
}
