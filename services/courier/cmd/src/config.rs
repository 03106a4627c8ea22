//! Configuration handling for the courier service.
//!
//! Settings come from a YAML file, then environment variables, then command
//! line flags, each layer overriding the previous one.

use anyhow::Result;
use courier_dispatch::{DispatchConfig, SchemaOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Courier service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// TCP listen address
    pub listen: String,
    /// Upper bound on shared handler pool threads
    pub max_pool_threads: usize,
    /// Thread name prefix
    pub thread_name: String,
    /// Handlers slower than this are logged
    pub slow_handler_threshold: Duration,
    /// Largest accepted envelope in bytes
    pub max_frame_bytes: usize,
    /// Output directory for schema files
    pub schema_dir: PathBuf,
    /// Schema file options
    pub schema: SchemaConfig,
}

/// Schema output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// File extension
    pub extension: String,
    /// Drop package lines
    pub remove_package: bool,
    /// Package override
    pub package: Option<String>,
    /// Suffix the package with the schema kind
    pub suffix_kind: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let options = SchemaOptions::default();
        Self {
            extension: options.extension,
            remove_package: options.remove_package,
            package: options.package,
            suffix_kind: options.suffix_kind,
        }
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        let dispatch = DispatchConfig::default();
        Self {
            listen: "127.0.0.1:7400".to_string(),
            max_pool_threads: dispatch.max_pool_threads,
            thread_name: dispatch.thread_name,
            slow_handler_threshold: dispatch.slow_handler_threshold,
            max_frame_bytes: 16 * 1024 * 1024,
            schema_dir: PathBuf::from("./schemas"),
            schema: SchemaConfig::default(),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    courier: Option<FileConfig>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    listen: Option<String>,
    max_pool_threads: Option<usize>,
    thread_name: Option<String>,
    slow_handler_threshold: Option<String>,
    max_frame_bytes: Option<usize>,
    schema_dir: Option<PathBuf>,
    schema: Option<FileSchemaConfig>,
}

#[derive(Debug, Deserialize)]
struct FileSchemaConfig {
    extension: Option<String>,
    remove_package: Option<bool>,
    package: Option<String>,
    suffix_kind: Option<bool>,
}

impl CourierConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    if let Some(file_config) = root_config.courier {
                        config.apply_file_config(file_config);
                    }
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", config_path.as_ref()),
        }

        config.apply_environment_overrides(|key| std::env::var(key).ok());

        info!(
            "Final courier configuration: listen={}, pool={}, slow={}",
            config.listen,
            config.max_pool_threads,
            humantime::format_duration(config.slow_handler_threshold)
        );

        Ok(config)
    }

    fn apply_file_config(&mut self, file: FileConfig) {
        if let Some(listen) = file.listen {
            self.listen = listen;
        }
        if let Some(threads) = file.max_pool_threads {
            self.max_pool_threads = threads;
        }
        if let Some(name) = file.thread_name {
            self.thread_name = name;
        }
        if let Some(raw) = file.slow_handler_threshold {
            match humantime::parse_duration(&raw) {
                Ok(threshold) => self.slow_handler_threshold = threshold,
                Err(e) => warn!("Ignoring slow_handler_threshold {:?}: {}", raw, e),
            }
        }
        if let Some(bytes) = file.max_frame_bytes {
            self.max_frame_bytes = bytes;
        }
        if let Some(dir) = file.schema_dir {
            self.schema_dir = dir;
        }
        if let Some(schema) = file.schema {
            if let Some(extension) = schema.extension {
                self.schema.extension = extension;
            }
            if let Some(remove) = schema.remove_package {
                self.schema.remove_package = remove;
            }
            if schema.package.is_some() {
                self.schema.package = schema.package;
            }
            if let Some(suffix) = schema.suffix_kind {
                self.schema.suffix_kind = suffix;
            }
        }
    }

    /// Apply environment variable overrides using `lookup` to read variables
    pub fn apply_environment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("COURIER_LISTEN") {
            info!("Listen address overridden by environment: {}", listen);
            self.listen = listen;
        }

        if let Some(threads) = lookup("COURIER_MAX_POOL_THREADS") {
            match threads.parse::<usize>() {
                Ok(n) => {
                    self.max_pool_threads = n;
                    info!("Pool threads overridden by environment: {}", n);
                }
                Err(_) => warn!("Ignoring invalid COURIER_MAX_POOL_THREADS={}", threads),
            }
        }

        if let Some(dir) = lookup("COURIER_SCHEMA_DIR") {
            self.schema_dir = PathBuf::from(dir);
            info!("Schema directory overridden by environment: {:?}", self.schema_dir);
        }
    }

    /// Dispatcher thread settings
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_max_pool_threads(self.max_pool_threads)
            .with_thread_name(self.thread_name.clone())
            .with_slow_handler_threshold(self.slow_handler_threshold)
    }

    /// Schema output options
    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            extension: self.schema.extension.clone(),
            remove_package: self.schema.remove_package,
            package: self.schema.package.clone(),
            suffix_kind: self.schema.suffix_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();
        assert_eq!(config.listen, "127.0.0.1:7400");
        assert_eq!(config.max_pool_threads, 64);
        assert_eq!(config.slow_handler_threshold, Duration::from_secs(5));
        assert_eq!(config.schema.extension, "cddl");
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
courier:
  listen: 0.0.0.0:9100
  max_pool_threads: 12
  slow_handler_threshold: 750ms
  schema_dir: /tmp/schemas
  schema:
    remove_package: true
    suffix_kind: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let mut config = CourierConfig::default();
        let root: RootConfig = serde_yaml::from_str(yaml_content).unwrap();
        config.apply_file_config(root.courier.unwrap());
        assert_eq!(config.listen, "0.0.0.0:9100");
        assert_eq!(config.max_pool_threads, 12);
        assert_eq!(config.slow_handler_threshold, Duration::from_millis(750));
        assert_eq!(config.schema_dir, PathBuf::from("/tmp/schemas"));
        assert!(config.schema.remove_package);
        assert!(config.schema.suffix_kind);
        assert_eq!(config.schema.extension, "cddl");

        let loaded = CourierConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.max_pool_threads, 12);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CourierConfig::load_from_file("/nonexistent/courier.yaml").unwrap();
        assert_eq!(config.max_frame_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("COURIER_LISTEN", "10.0.0.1:7000"),
            ("COURIER_MAX_POOL_THREADS", "not-a-number"),
            ("COURIER_SCHEMA_DIR", "/srv/schemas"),
        ]
        .into_iter()
        .collect();

        let mut config = CourierConfig::default();
        let before = config.max_pool_threads;
        config.apply_environment_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.listen, "10.0.0.1:7000");
        assert_eq!(config.max_pool_threads, before);
        assert_eq!(config.schema_dir, PathBuf::from("/srv/schemas"));
    }

    #[test]
    fn test_pool_threads_from_environment() {
        let mut config = CourierConfig::default();
        config.apply_environment_overrides(|key| {
            (key == "COURIER_MAX_POOL_THREADS").then(|| "6".to_string())
        });
        assert_eq!(config.max_pool_threads, 6);
        assert_eq!(config.dispatch_config().max_pool_threads, 6);
    }

    #[test]
    fn test_dispatch_config_conversion() {
        let config = CourierConfig {
            max_pool_threads: 8,
            ..Default::default()
        };
        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.max_pool_threads, 8);
        assert_eq!(dispatch.thread_name, "courier-dispatch");
    }
}
