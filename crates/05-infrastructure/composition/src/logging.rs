//! 日志初始化

use infrastructure_common::InfrastructureError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 启动时是否初始化日志系统
    pub enabled: bool,
    /// 日志级别
    pub level: String,
    /// 过滤规则，设置后优先于 `level`，语法同 `RUST_LOG`
    pub filter: Option<String>,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
            filter: None,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingSettings {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            ..Self::default()
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            enabled: true,
            json_format: true,
            ..Self::default()
        }
    }

    fn directives(&self) -> &str {
        self.filter.as_deref().unwrap_or(&self.level)
    }
}

/// 初始化全局日志订阅者
///
/// 已经存在全局订阅者时不做任何事并返回 `false`。
pub fn init_logging(settings: &LoggingSettings) -> Result<bool, InfrastructureError> {
    let directives = settings.directives();
    let filter = EnvFilter::try_new(directives).map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志过滤规则无效: {}, {}", directives, e),
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(settings.show_target)
        .with_thread_ids(settings.show_thread_ids)
        .with_file(settings.show_file)
        .with_line_number(settings.show_line_number);

    let result = if settings.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => {
            info!("日志系统初始化完成: {}", directives);
            Ok(true)
        }
        Err(e) => {
            debug!("日志系统已初始化, 跳过: {}", e);
            Ok(false)
        }
    }
}
