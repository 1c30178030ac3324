use std::sync::Arc;

use async_trait::async_trait;

use dyntask_core::{traits::TaskElementsOperation, SchedulerResult, TaskElement};

use crate::loader::TaskElementLoader;

/// 基于任务元素加载器的数据源操作实现
pub struct LoaderTaskElementsOperation {
    loader: Arc<TaskElementLoader>,
}

impl LoaderTaskElementsOperation {
    pub fn new(loader: Arc<TaskElementLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl TaskElementsOperation for LoaderTaskElementsOperation {
    async fn purge_all(&self) -> SchedulerResult<()> {
        self.loader.purge().await
    }

    async fn fetch_all(&self) -> SchedulerResult<Vec<TaskElement>> {
        self.loader.load(Some(|_: &TaskElement| true)).await
    }

    async fn fetch_needing_check(&self) -> SchedulerResult<Vec<TaskElement>> {
        self.loader
            .load(Some(|e: &TaskElement| {
                e.is_after_update() || (e.update_sign == 0 && !e.has_task_id())
            }))
            .await
    }

    async fn after_start(&self, registered: &[TaskElement]) -> SchedulerResult<()> {
        self.loader.update(registered).await
    }

    async fn after_run(&self, checked: &[TaskElement]) -> SchedulerResult<()> {
        self.loader.update(checked).await
    }

    async fn find_by_id(&self, id: &str) -> SchedulerResult<Option<TaskElement>> {
        let matched = self.loader.load(Some(|e: &TaskElement| e.id == id)).await?;
        Ok(matched.into_iter().next())
    }
}
