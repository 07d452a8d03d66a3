// crates/hx_config/src/error.rs

//! 配置层错误类型

use hx_foundation::HxError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),

    /// 选项组合不兼容
    #[error("选项不兼容 '{first}' + '{second}': {reason}")]
    Incompatible {
        /// 第一个选项
        first: String,
        /// 第二个选项
        second: String,
        /// 原因
        reason: String,
    },
}

impl ConfigError {
    /// 无效值
    pub fn invalid(key: &str, value: impl ToString, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for HxError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => HxError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => HxError::serialization(msg),
            ConfigError::InvalidValue { key, value, reason } => {
                HxError::invalid_config(key, value, reason)
            }
            ConfigError::Missing(key) => HxError::missing_config(key),
            ConfigError::Incompatible {
                first,
                second,
                reason,
            } => HxError::incompatible(first, second, reason),
        }
    }
}
