//! Configuration loading

use anyhow::Result;

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. TOPOWATCH_CONFIG_PATH environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (Kubernetes mount path)
/// 4. Fall back to environment variables only
///
/// A value that does not deserialize is an error, never a silent default.
///
/// Runs before logging is initialised, so progress goes to stderr.
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("TOPOWATCH_CONFIG_PATH")
        .ok()
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| std::path::Path::new(p).exists())
                .map(str::to_string)
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config from environment: {e}"))?
    };

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::EnvGuard;

    #[test]
    fn test_env_only_config() {
        let _env = EnvGuard::set(&[("TOPOWATCH_WEBHOOK__URL", "http://sink.example:9000/hook")]);

        let config = load_config().unwrap();
        assert_eq!(config.webhook.url, "http://sink.example:9000/hook");
        assert!(config.webhook.is_enabled());
    }

    #[test]
    fn test_bad_env_value_is_fatal() {
        let _env = EnvGuard::set(&[
            ("TOPOWATCH_WEBHOOK__URL", "http://sink.example:9000/hook"),
            ("TOPOWATCH_CACHE__TTL_SECONDS", "thirty"),
        ]);

        let err = load_config().unwrap_err();
        assert!(err.to_string().contains("environment"), "{err}");
    }
}
