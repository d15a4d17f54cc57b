//! 容器启动器

use crate::logging::init_logging;
use crate::settings::ContainerSettings;
use crate::source::{DefinitionSource, FactoryCatalog, ManifestDefinitionSource};
use di_abstractions::{ContainerBuilder, IocContainer};
use di_impl::DiContainer;
use infrastructure_common::InfrastructureError;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// 容器启动器
///
/// 负责协调启动顺序：初始化日志、依次加载各定义源、最后解析清单，然后构建容器。
pub struct ContainerBootstrapper {
    /// 启动配置
    settings: ContainerSettings,
    /// 清单使用的工厂目录
    catalog: Arc<FactoryCatalog>,
    /// 定义源列表
    sources: Vec<Box<dyn DefinitionSource>>,
    /// 覆盖配置中的日志开关
    logging: Option<bool>,
}

impl ContainerBootstrapper {
    /// 创建新的容器启动器
    pub fn new(settings: ContainerSettings) -> Self {
        Self {
            settings,
            catalog: Arc::new(FactoryCatalog::new()),
            sources: Vec::new(),
            logging: None,
        }
    }

    /// 从配置文件创建启动器
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InfrastructureError> {
        Ok(Self::new(ContainerSettings::load(path)?))
    }

    /// 设置清单使用的工厂目录
    pub fn with_catalog(mut self, catalog: FactoryCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// 添加定义源，按添加顺序加载
    pub fn add_source(mut self, source: impl DefinitionSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// 设置是否初始化日志系统
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = Some(enabled);
        self
    }

    /// 启动配置
    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    /// 启动容器
    pub async fn bootstrap(self) -> Result<DiContainer, InfrastructureError> {
        if self.logging.unwrap_or(self.settings.logging.enabled) {
            init_logging(&self.settings.logging)?;
        }

        info!(
            "开始启动容器: {} 个定义源, {} 个清单组件",
            self.sources.len(),
            self.settings.components.len()
        );

        let mut builder = DiContainer::builder().with_config(self.settings.container.clone());

        let manifest = (!self.settings.components.is_empty()).then(|| {
            ManifestDefinitionSource::new(self.settings.components.clone(), self.catalog.clone())
        });
        let mut sources: Vec<&dyn DefinitionSource> = Vec::with_capacity(self.sources.len() + 1);
        for source in &self.sources {
            sources.push(source.as_ref());
        }
        if let Some(manifest) = &manifest {
            sources.push(manifest);
        }

        for source in sources {
            let definitions = source.load_definitions().await.map_err(|e| {
                error!("定义源 {} 加载失败: {}", source.name(), e);
                e
            })?;
            info!("定义源 {} 提供 {} 个组件", source.name(), definitions.len());
            builder.register_all(definitions)?;
        }

        let container = builder.build().map_err(|e| {
            error!("容器构建失败: {}", e);
            e
        })?;

        let stats = container.stats();
        info!(
            "容器启动完成: {} 个激活组件, {} 个被排除, {} 个单例就绪",
            stats.active_components, stats.pruned_components, stats.ready_singletons
        );
        Ok(container)
    }
}

impl std::fmt::Debug for ContainerBootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBootstrapper")
            .field("settings", &self.settings)
            .field("catalog", &self.catalog.len())
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("logging", &self.logging)
            .finish()
    }
}
