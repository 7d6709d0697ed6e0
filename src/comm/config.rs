use anyhow::{anyhow, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tracing::info;

lazy_static! {
    static ref GLOBAL_CONFIG_MANAGER: RwLock<Option<Arc<ConfigManager>>> = RwLock::new(None);
}

/// 环境变量前缀 / Environment variable prefix
pub const ENV_PREFIX: &str = "RELAY";

/// 配置错误类型 / Config error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },
}

/// 配置数据源信息 / Config source info
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置管理器 / Config manager
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 使用默认配置源创建 / Create with default sources only
    pub fn new() -> Result<Self> {
        Self::with_sources(vec![])
    }

    /// 使用指定的配置源创建配置管理器
    /// Create a manager with extra sources layered over the defaults.
    ///
    /// 优先级从低到高 / Priority, lowest first:
    /// development.toml -> default.toml -> production.toml -> extra sources -> environment
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        let default_files = vec![
            ConfigSource::File {
                path: "config/development.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/default.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/production.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
        ];
        let env = ConfigSource::Env {
            prefix: ENV_PREFIX.to_string(),
            separator: "__",
        };

        let mut priority = 1u8;
        for source in default_files.into_iter().chain(sources).chain(std::iter::once(env)) {
            let mut source_info = source.get_source_info(priority);
            priority = priority.saturating_add(1);

            if let ConfigSource::File { path, required, .. } = &source {
                if !std::path::Path::new(path).exists() {
                    if *required {
                        return Err(ConfigError::FileNotFound { path: path.clone() }.into());
                    }
                    sources_info.push(source_info);
                    continue;
                }
            }

            builder = source.add_to_builder(builder)?;
            source_info.loaded = true;
            sources_info.push(source_info);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build config: {}", e))?;
        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 获取指定 key 的配置值 / Get a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.config
            .get(key)
            .map_err(|e| anyhow!("failed to read config '{}': {}", key, e))
    }

    /// 获取配置值，不存在返回默认值 / Get a value or fall back to `default`
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// 打印配置源信息 / Log every config source and whether it was loaded
    pub fn print_sources_info(&self) {
        for (index, info) in self.sources_info.iter().enumerate() {
            let status = if info.loaded { "loaded" } else { "skipped" };
            info!(
                "🔧 config source {}: {} [{}] priority={} {}",
                index + 1,
                info.source_type,
                status,
                info.priority,
                info.description
            );
        }
    }
}

/// 配置源类型 / Config source kinds
pub enum ConfigSource {
    /// 文件配置源 / File source
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源 / Environment source
    Env {
        prefix: String,
        separator: &'static str,
    },
    /// 字符串配置源 / Inline string source
    String { content: String, format: FileFormat },
}

impl ConfigSource {
    pub fn get_source_info(&self, priority: u8) -> ConfigSourceInfo {
        let (source_type, description) = match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => (
                "File",
                format!(
                    "{} (format: {}, required: {})",
                    path,
                    format.as_ref().map(format_name).unwrap_or("auto"),
                    required
                ),
            ),
            ConfigSource::Env { prefix, separator } => (
                "Environment",
                format!("prefix={} separator={}", prefix, separator),
            ),
            ConfigSource::String { format, .. } => {
                ("String", format!("format={}", format_name(format)))
            }
        };
        ConfigSourceInfo {
            source_type: source_type.to_string(),
            description,
            priority,
            loaded: false,
        }
    }

    pub fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                Ok(builder.add_source(file_source.required(required)))
            }
            ConfigSource::Env { prefix, separator } => Ok(builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator(separator)
                    .prefix_separator("_")
                    .ignore_empty(true),
            )),
            ConfigSource::String { content, format } => {
                Ok(builder.add_source(File::from_str(&content, format)))
            }
        }
    }
}

fn format_name(format: &FileFormat) -> &'static str {
    match format {
        FileFormat::Toml => "TOML",
        FileFormat::Yaml => "YAML",
        FileFormat::Json => "JSON",
        FileFormat::Ini => "INI",
        FileFormat::Ron => "RON",
        FileFormat::Json5 => "JSON5",
        _ => "unknown",
    }
}

/// 使用指定文件初始化全局配置 / Initialize the global manager with an explicit file
pub fn init_global_config_with_file(path: &str) -> Result<Arc<ConfigManager>> {
    let manager = Arc::new(ConfigManager::with_sources(vec![ConfigSource::File {
        path: path.to_string(),
        format: None,
        required: true,
    }])?);
    let mut global = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|e| anyhow!("global config lock poisoned: {}", e))?;
    *global = Some(Arc::clone(&manager));
    Ok(manager)
}

/// 获取全局配置管理器实例（单例模式）/ Get the global manager, creating a default one lazily
pub fn get_global_config_manager() -> Result<Arc<ConfigManager>> {
    {
        let manager = GLOBAL_CONFIG_MANAGER
            .read()
            .map_err(|e| anyhow!("global config lock poisoned: {}", e))?;
        if let Some(ref config_manager) = *manager {
            return Ok(Arc::clone(config_manager));
        }
    }
    let mut manager = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|e| anyhow!("global config lock poisoned: {}", e))?;
    match manager.as_ref() {
        Some(existing) => Ok(Arc::clone(existing)),
        None => {
            let config_manager = Arc::new(ConfigManager::new()?);
            *manager = Some(Arc::clone(&config_manager));
            Ok(config_manager)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ConfigManager, ConfigSource};
    use config::FileFormat;
    
    #[test]
    fn test_config_manager_new() {
        let manager = ConfigManager::new();
        assert!(manager.is_ok());
    }

    #[test]
    fn test_config_from_string() {
        let source = ConfigSource::String {
            content: "[gateway]\nport = 5300".to_string(),
            format: FileFormat::Toml,
        };
        let manager = ConfigManager::with_sources(vec![source]).unwrap();
        assert_eq!(manager.get::<i64>("gateway.port").unwrap(), 5300);
        assert_eq!(manager.get_or::<i64>("gateway.idle_timeout_ms", 7), 7);
    }

    #[test]
    fn test_required_file_missing_is_an_error() {
        let source = ConfigSource::File {
            path: "config/does-not-exist.toml".to_string(),
            format: Some(FileFormat::Toml),
            required: true,
        };
        match ConfigManager::with_sources(vec![source]) {
            Err(err) => assert!(matches!(
                err.downcast_ref::<ConfigError>(),
                Some(ConfigError::FileNotFound { .. })
            )),
            Ok(_) => panic!("a missing required file must fail"),
        }
    }
}
