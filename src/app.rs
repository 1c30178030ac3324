use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use dyntask_core::{
    traits::{SchedulerRepository, TaskRunnable},
    AppConfig, SchedulerResult,
};
use dyntask_engine::{DatasourceScheduler, LoaderTaskElementsOperation, TaskElementLoader};
use dyntask_infrastructure::{JsonFileElementSource, LocalSchedulerRepository, RunnableRegistry};

/// 主应用程序
///
/// 把JSON文件数据源、协调引擎和进程内调度后端装配在一起。
pub struct Application {
    engine: Arc<DatasourceScheduler>,
    repository: Arc<LocalSchedulerRepository>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, registry: Arc<RunnableRegistry>) -> Result<Self> {
        info!("初始化应用程序，任务定义文件: {}", config.source.path);

        let source = Arc::new(JsonFileElementSource::new(&config.source.path));
        let loader = Arc::new(TaskElementLoader::new(source));
        let operation = Arc::new(LoaderTaskElementsOperation::new(loader));
        let repository = Arc::new(LocalSchedulerRepository::new());

        let engine = DatasourceScheduler::new(
            operation,
            repository.clone(),
            registry,
            config.engine.clone(),
        );

        Ok(Self { engine, repository })
    }

    /// 运行应用直至收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.engine.init().await.context("引擎初始化失败")?;
        self.engine.start().await.context("引擎启动失败")?;
        self.repository.start().await.context("调度后端启动失败")?;

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        if let Err(e) = self.engine.stop().await {
            error!("引擎停止失败: {e}");
        }
        Ok(())
    }
}

/// 内置的心跳执行单元
pub struct HeartbeatRunnable;

#[async_trait]
impl TaskRunnable for HeartbeatRunnable {
    async fn run(&self) -> SchedulerResult<()> {
        info!("心跳任务触发");
        Ok(())
    }
}
