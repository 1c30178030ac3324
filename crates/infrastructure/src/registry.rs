use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use dyntask_core::{
    traits::{TaskRunnable, TaskRunnableResolver},
    SchedulerError, SchedulerResult, TaskElement,
};

/// 按名称管理可执行单元的注册表
///
/// 任务元素通过`name`字段查找执行单元，由调用方在启动前注册。
pub struct RunnableRegistry {
    runnables: RwLock<HashMap<String, Arc<dyn TaskRunnable>>>,
}

impl RunnableRegistry {
    pub fn new() -> Self {
        Self {
            runnables: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, name: impl Into<String>, runnable: Arc<dyn TaskRunnable>) {
        self.runnables.write().await.insert(name.into(), runnable);
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.runnables.read().await.contains_key(name)
    }
}

impl Default for RunnableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunnableResolver for RunnableRegistry {
    async fn resolve(&self, element: &TaskElement) -> SchedulerResult<Arc<dyn TaskRunnable>> {
        self.runnables
            .read()
            .await
            .get(&element.name)
            .cloned()
            .ok_or_else(|| SchedulerError::RunnableNotFound(element.name.clone()))
    }
}
