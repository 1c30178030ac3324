use std::sync::Arc;

use async_trait::async_trait;

use crate::{models::TaskElement, SchedulerResult};

/// 可被调度执行的任务单元
#[async_trait]
pub trait TaskRunnable: Send + Sync {
    /// 执行一次任务，失败由调度后端记录
    async fn run(&self) -> SchedulerResult<()>;
}

/// 调度后端接口
///
/// 真正持有定时器的后端。注册成功后返回的标识是后续更新、移除和
/// 查询的唯一句柄，同一标识同时至多存在一个活动定时器。
#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// 注册一个调度任务，返回后端分配的标识
    async fn register(
        &self,
        expression: &str,
        runnable: Arc<dyn TaskRunnable>,
    ) -> SchedulerResult<String>;

    /// 更新已注册任务的调度表达式
    async fn update(&self, task_id: &str, expression: &str) -> SchedulerResult<()>;

    /// 移除已注册的任务
    async fn remove(&self, task_id: &str) -> SchedulerResult<()>;

    /// 查询已注册任务当前生效的调度表达式
    async fn schedule_info(&self, task_id: &str) -> SchedulerResult<Option<String>>;

    /// 启动后端，在此之前注册的任务不会触发
    async fn start(&self) -> SchedulerResult<()>;
}

/// 将任务元素解析为可执行单元
///
/// 非管理任务的执行单元由调用方提供，按任务元素查找。
#[async_trait]
pub trait TaskRunnableResolver: Send + Sync {
    async fn resolve(&self, element: &TaskElement) -> SchedulerResult<Arc<dyn TaskRunnable>>;
}
