use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// driver 的运行配置
///
/// ```toml
/// log_level = "debug"
/// sync_timeout_ms = 2000
/// present = false
/// compute_queues = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 传给 `init_log` 的日志级别
    pub log_level: String,

    /// 等待宿主队列完成的诊断超时，0 表示无限等待
    pub sync_timeout_ms: u64,

    /// 无窗口运行时关闭
    pub present: bool,

    /// 是否允许游戏映射 compute 队列
    pub compute_queues: bool,
}
impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sync_timeout_ms: 0,
            present: true,
            compute_queues: true,
        }
    }
}
impl DriverConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("解析 driver 配置失败")
    }

    /// 从 TOML 文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    /// 以配置中的级别初始化全局日志，只能调用一次
    pub fn init_log(&self) {
        sable_crate_tools::init_log::init_log(&self.log_level);
    }

    #[inline]
    pub fn sync_timeout(&self) -> Option<Duration> {
        (self.sync_timeout_ms != 0).then(|| Duration::from_millis(self.sync_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = DriverConfig::from_toml_str("present = false").unwrap();
        assert!(!config.present);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.sync_timeout(), None);
    }

    #[test]
    fn test_timeout() {
        let config = DriverConfig::from_toml_str("sync_timeout_ms = 250\nlog_level = \"trace\"").unwrap();
        assert_eq!(config.sync_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(DriverConfig::from_toml_str("present = 3").is_err());
        assert!(DriverConfig::load("/nonexistent/sable.toml").is_err());
    }
}
