use crate::error::{ConfigError, Result};
use crate::service::TolerancePolicy;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 应用配置
///
/// 加载顺序: 内置默认值 < config/default.toml (可选) < 环境变量
/// (前缀 AUDIT，层级分隔符 `__`，如 `AUDIT_SERVER__PORT=9090`)。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audit: AuditConfig,
    pub batch: BatchConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 容差阈值 (百分比)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub pass_max_percent: BigDecimal,
    pub review_max_percent: BigDecimal,
    pub pass_through_codes: Vec<String>,
    /// 视为基础运费的发票代码
    pub freight_codes: Vec<String>,
    /// 无代码发票行的运费描述短语
    pub freight_phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 启动时加载的费率数据集
    #[serde(default)]
    pub rate_card_path: Option<String>,
    pub retain_versions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = TolerancePolicy::default();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audit: AuditConfig {
                pass_max_percent: policy.pass_max_percent,
                review_max_percent: policy.review_max_percent,
                pass_through_codes: policy.pass_through_codes,
                freight_codes: policy.freight_codes,
                freight_phrases: policy.freight_phrases,
            },
            batch: BatchConfig {
                workers: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4),
            },
            store: StoreConfig {
                rate_card_path: None,
                retain_versions: 5,
            },
            log: LogConfig {
                filter: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 默认值 + 可选配置文件 + 环境变量
    pub fn load() -> Result<Self> {
        Self::load_from("config/default")
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("AUDIT")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("audit.pass_through_codes")
                    .with_list_parse_key("audit.freight_codes")
                    .with_list_parse_key("audit.freight_phrases")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn tolerance_policy(&self) -> std::result::Result<TolerancePolicy, ConfigError> {
        let policy = TolerancePolicy::new(
            self.audit.pass_max_percent.clone(),
            self.audit.review_max_percent.clone(),
            self.audit.pass_through_codes.clone(),
        )?;
        Ok(policy.with_freight(&self.audit.freight_codes, &self.audit.freight_phrases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9191\n\n[audit]\npass_max_percent = \"3\"\nreview_max_percent = \"10\"\n\
             freight_codes = [\"FRT\", \"wpx\"]\n"
        )
        .unwrap();

        let config = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.host, "127.0.0.1");

        let policy = config.tolerance_policy().unwrap();
        assert_eq!(policy.pass_max_percent, BigDecimal::from(3));
        assert_eq!(policy.review_max_percent, BigDecimal::from(10));
        assert!(policy.is_pass_through("FSC"));
        assert_eq!(policy.freight_codes, vec!["FRT".to_string(), "WPX".to_string()]);
        assert_eq!(policy.freight_phrases, TolerancePolicy::default().freight_phrases);
    }

    #[test]
    fn defaults_match_tolerance_policy() {
        let config = AppConfig::default();
        assert_eq!(config.tolerance_policy().unwrap(), TolerancePolicy::default());
        assert!(config.batch.workers >= 1);
    }
}
