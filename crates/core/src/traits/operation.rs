use async_trait::async_trait;

use crate::{models::TaskElement, SchedulerResult};

/// 数据源任务元素操作接口
///
/// 协调引擎与数据源之间的接缝。引擎从不直接写数据源，所有变更都
/// 经由`after_start`/`after_run`交回调用方持久化。
#[async_trait]
pub trait TaskElementsOperation: Send + Sync {
    /// 清理数据源中的无效残留状态
    async fn purge_all(&self) -> SchedulerResult<()>;

    /// 读取全部任务元素
    async fn fetch_all(&self) -> SchedulerResult<Vec<TaskElement>>;

    /// 读取需要协调的子集：有未应用变更的，以及新插入还未注册的
    async fn fetch_needing_check(&self) -> SchedulerResult<Vec<TaskElement>>;

    /// 启动注册完成后回写结果
    async fn after_start(&self, registered: &[TaskElement]) -> SchedulerResult<()>;

    /// 一轮协调完成后回写结果
    async fn after_run(&self, checked: &[TaskElement]) -> SchedulerResult<()>;

    /// 按标识查找单个任务元素
    async fn find_by_id(&self, id: &str) -> SchedulerResult<Option<TaskElement>>;
}
