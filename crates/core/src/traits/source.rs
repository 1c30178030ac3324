use std::time::SystemTime;

use async_trait::async_trait;

use crate::{models::TaskElement, SchedulerResult};

/// 任务元素后端存储接口
///
/// 加载器通过该接口读写实际存储。存储可以是文件、数据库表或任何
/// 带有可读修改标记、内容可解码为任务元素序列的资源。
#[async_trait]
pub trait ElementSource: Send + Sync {
    /// 读取存储的修改标记；读取失败时返回None，调用方按"已变更"处理
    async fn modified_at(&self) -> Option<SystemTime>;

    /// 全量读取并解码任务元素
    ///
    /// 存储缺失、内容无法解码、类型不符都归入
    /// [`SchedulerError::ElementLoad`](crate::SchedulerError::ElementLoad)。
    async fn read_elements(&self) -> SchedulerResult<Vec<TaskElement>>;

    /// 将缓存内容写回存储
    async fn write_back(&self, elements: &[TaskElement]) -> SchedulerResult<()>;

    /// 清理单个元素中的无效数据，返回元素是否被修改
    fn purge(&self, element: &mut TaskElement) -> bool;

    /// 将单个元素合并进缓存列表
    fn merge(&self, cached: &mut Vec<TaskElement>, incoming: &TaskElement);
}
