use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dyntask_core::{
    traits::{SchedulerRepository, TaskElementsOperation, TaskRunnable, TaskRunnableResolver},
    EngineConfig, SchedulerError, SchedulerResult, TaskElement,
};

/// 注册成功
pub const STATUS_RUNNING: &str = "运行中";
/// 已从调度后端移除
pub const STATUS_STOPPED: &str = "已停止";
/// 期望状态为非激活，未注册
pub const STATUS_NOT_ACTIVATED: &str = "未激活";
/// 运行环境不匹配，未注册
pub const STATUS_PROFILE_MISMATCH: &str = "运行环境不匹配";

/// 引擎生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Created,
    Initialized,
    Running,
    Stopped,
}

/// 数据源驱动的调度协调引擎
///
/// 持续把数据源中描述的任务集合与调度后端中实际注册的任务集合
/// 对齐：新增的注册、暂停的移除、表达式变化的更新，全部在不重启
/// 进程的前提下完成。
///
/// 引擎自身不持有任何线程或定时器。`init`/`start`/`stop`由外部
/// 生命周期驱动方同步调用；`run`由调度后端在管理任务的调度点上
/// 触发。管理任务既可以来自数据源中的管理记录，也可以在启动时
/// 由引擎自注册，协调循环因此本身就是它所管理的任务之一。
pub struct DatasourceScheduler {
    operation: Arc<dyn TaskElementsOperation>,
    repository: Arc<dyn SchedulerRepository>,
    resolver: Arc<dyn TaskRunnableResolver>,
    config: EngineConfig,
    phase: Mutex<EnginePhase>,
    manager_task_id: Mutex<Option<String>>,
    self_ref: Weak<Self>,
}

impl DatasourceScheduler {
    /// 创建引擎实例
    ///
    /// 返回`Arc`：管理任务的执行单元需要持有对引擎自身的弱引用。
    pub fn new(
        operation: Arc<dyn TaskElementsOperation>,
        repository: Arc<dyn SchedulerRepository>,
        resolver: Arc<dyn TaskRunnableResolver>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            operation,
            repository,
            resolver,
            config,
            phase: Mutex::new(EnginePhase::Created),
            manager_task_id: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// 初始化引擎，清理数据源中的残留状态
    ///
    /// 清理失败直接向上传播，初始化是快速失败的。
    pub async fn init(&self) -> SchedulerResult<()> {
        self.ensure_phase(&[EnginePhase::Created, EnginePhase::Stopped], "init")
            .await?;
        self.operation.purge_all().await?;
        self.set_phase(EnginePhase::Initialized).await;
        info!("调度引擎初始化完成");
        Ok(())
    }

    /// 启动引擎，注册数据源中的全部任务
    ///
    /// 数据源为空时只记录日志直接返回，不会创建管理任务：没有
    /// 需要管理的任务时也不需要协调循环。
    pub async fn start(&self) -> SchedulerResult<()> {
        self.ensure_phase(&[EnginePhase::Initialized], "start").await?;

        let mut elements = self.operation.fetch_all().await?;
        if elements.is_empty() {
            info!("数据源中没有任务元素，跳过启动注册");
            self.set_phase(EnginePhase::Running).await;
            return Ok(());
        }

        let mut manager_present = false;
        for element in elements.iter_mut() {
            if element.id == self.config.manager_id {
                manager_present = true;
            }
            self.register_element(element).await?;
        }

        if !manager_present {
            let runnable: Arc<dyn TaskRunnable> = Arc::new(ManagerRunnable {
                engine: self.self_ref.clone(),
            });
            let task_id = self
                .repository
                .register(&self.config.manager_expression, runnable)
                .await?;
            info!("数据源中没有管理任务，已按默认表达式自注册协调任务 {task_id}");
            *self.manager_task_id.lock().await = Some(task_id);
        }

        self.operation.after_start(&elements).await?;
        self.set_phase(EnginePhase::Running).await;
        info!("调度引擎启动完成，共处理 {} 个任务元素", elements.len());
        Ok(())
    }

    /// 执行一轮协调
    ///
    /// 由调度后端在管理任务的调度点上触发，每次可能在不同线程。
    /// 没有待检查元素是常态，必须廉价返回。
    pub async fn run(&self) -> SchedulerResult<()> {
        if self.phase().await != EnginePhase::Running {
            warn!("引擎未处于运行状态，跳过本次协调");
            return Ok(());
        }

        let mut elements = self.operation.fetch_needing_check().await?;
        if elements.is_empty() {
            debug!("没有待检查的任务元素");
            return Ok(());
        }

        debug!("开始协调 {} 个任务元素", elements.len());
        for element in elements.iter_mut() {
            if element.is_after_update() {
                self.apply_update(element).await?;
                element.update_sign = 0;
            } else if element.is_after_insert() {
                self.register_element(element).await?;
            }
        }

        self.operation.after_run(&elements).await?;
        Ok(())
    }

    /// 停止引擎
    ///
    /// 尽力移除所有已注册的调度任务，单个移除失败不会中断其余
    /// 任务的移除，最后再清理一次数据源。
    pub async fn stop(&self) -> SchedulerResult<()> {
        self.ensure_phase(&[EnginePhase::Initialized, EnginePhase::Running], "stop")
            .await?;

        let manager_task_id = self.manager_task_id.lock().await.take();
        if let Some(task_id) = &manager_task_id {
            if let Err(e) = self.repository.remove(task_id).await {
                warn!("移除管理任务 {task_id} 失败: {e}");
            }
        }

        match self.operation.fetch_all().await {
            Ok(elements) => {
                for element in &elements {
                    let Some(task_id) = element.task_id.as_deref().filter(|id| !id.is_empty())
                    else {
                        continue;
                    };
                    if manager_task_id.as_deref() == Some(task_id) {
                        continue;
                    }
                    if let Err(e) = self.repository.remove(task_id).await {
                        warn!("移除任务 {} 的调度 {task_id} 失败: {e}", element.id);
                    }
                }
            }
            Err(e) => warn!("停止时读取任务元素失败: {e}"),
        }

        self.operation.purge_all().await?;
        self.set_phase(EnginePhase::Stopped).await;
        info!("调度引擎已停止");
        Ok(())
    }

    /// 当前生命周期阶段
    pub async fn phase(&self) -> EnginePhase {
        *self.phase.lock().await
    }

    /// 管理任务当前在调度后端的标识
    pub async fn manager_task_id(&self) -> Option<String> {
        self.manager_task_id.lock().await.clone()
    }

    /// 处理一条有未应用变更的记录
    async fn apply_update(&self, element: &mut TaskElement) -> SchedulerResult<()> {
        if element.will_be_paused() {
            let task_id = element.task_id.clone().unwrap_or_default();
            if element.id == self.config.manager_id {
                // 管理任务停止后协调能力随之丢失，记录但不阻止
                warn!("管理任务 {} 即将停止，后续变更需要重新启动引擎才能生效", element.id);
                *self.manager_task_id.lock().await = None;
            }
            self.repository.remove(&task_id).await?;
            element.task_id = None;
            element.status_description = Some(STATUS_STOPPED.to_string());
            info!("任务 {} 已暂停并从调度后端移除", element.id);
        } else if element.will_be_active() {
            self.register_element(element).await?;
        } else if let Some(task_id) = element.task_id.as_deref().filter(|id| !id.is_empty()) {
            let armed = self.repository.schedule_info(task_id).await?;
            if element.expression_changed(armed.as_deref()) {
                self.repository.update(task_id, &element.expression).await?;
                info!("任务 {} 的调度表达式已更新为 {}", element.id, element.expression);
            }
        }
        Ok(())
    }

    /// 注册单条记录到调度后端
    ///
    /// 非激活状态和环境不匹配是业务规则跳过，只写状态描述，不报错。
    async fn register_element(&self, element: &mut TaskElement) -> SchedulerResult<()> {
        if element.is_inactive() {
            element.status_description = Some(STATUS_NOT_ACTIVATED.to_string());
            debug!("任务 {} 期望状态为非激活，跳过注册", element.id);
            return Ok(());
        }

        if !self.profile_matches(element) {
            element.status_description = Some(STATUS_PROFILE_MISMATCH.to_string());
            debug!(
                "任务 {} 的运行环境 {} 与当前环境不匹配，跳过注册",
                element.id, element.profiles
            );
            return Ok(());
        }

        let is_manager = element.id == self.config.manager_id;
        let runnable: Arc<dyn TaskRunnable> = if is_manager {
            Arc::new(ManagerRunnable {
                engine: self.self_ref.clone(),
            })
        } else {
            self.resolver.resolve(element).await?
        };

        let task_id = self.repository.register(&element.expression, runnable).await?;
        if is_manager {
            *self.manager_task_id.lock().await = Some(task_id.clone());
        }
        info!("任务 {} 已注册到调度后端: {task_id}", element.id);
        element.task_id = Some(task_id);
        element.status_description = Some(STATUS_RUNNING.to_string());
        Ok(())
    }

    fn profile_matches(&self, element: &TaskElement) -> bool {
        let profiles = element.profiles.trim();
        if profiles.is_empty() {
            return true;
        }
        profiles
            .split(',')
            .map(str::trim)
            .any(|tag| self.config.active_profiles.iter().any(|active| active == tag))
    }

    async fn ensure_phase(&self, expected: &[EnginePhase], operation: &str) -> SchedulerResult<()> {
        let current = *self.phase.lock().await;
        if expected.contains(&current) {
            Ok(())
        } else {
            Err(SchedulerError::Lifecycle(format!(
                "当前阶段 {current:?} 不允许执行 {operation}"
            )))
        }
    }

    async fn set_phase(&self, next: EnginePhase) {
        *self.phase.lock().await = next;
    }
}

/// 把引擎自身的`run`入口包装成可调度单元
///
/// 持弱引用：引擎被释放后残留的定时器触发只会安静跳过。
struct ManagerRunnable {
    engine: Weak<DatasourceScheduler>,
}

#[async_trait]
impl TaskRunnable for ManagerRunnable {
    async fn run(&self) -> SchedulerResult<()> {
        match self.engine.upgrade() {
            Some(engine) => engine.run().await,
            None => {
                warn!("调度引擎已被释放，跳过协调");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        InMemoryElementSource, RecordingRepository, StaticResolver, TaskElementBuilder,
    };
    use crate::{LoaderTaskElementsOperation, TaskElementLoader};

    fn engine_with_profiles(profiles: Vec<String>) -> Arc<DatasourceScheduler> {
        let source = Arc::new(InMemoryElementSource::new(Vec::new()));
        let loader = Arc::new(TaskElementLoader::new(source));
        let operation = Arc::new(LoaderTaskElementsOperation::new(loader));
        let repository = Arc::new(RecordingRepository::new());
        let config = EngineConfig {
            active_profiles: profiles,
            ..EngineConfig::default()
        };
        DatasourceScheduler::new(operation, repository, Arc::new(StaticResolver::noop()), config)
    }

    #[tokio::test]
    async fn test_profile_matching() {
        let engine = engine_with_profiles(vec!["prod".to_string(), "staging".to_string()]);

        let eligible = TaskElementBuilder::new("t1").profiles("dev, prod").build();
        assert!(engine.profile_matches(&eligible));

        let blank = TaskElementBuilder::new("t2").build();
        assert!(engine.profile_matches(&blank));

        let mismatch = TaskElementBuilder::new("t3").profiles("dev").build();
        assert!(!engine.profile_matches(&mismatch));
    }
}
