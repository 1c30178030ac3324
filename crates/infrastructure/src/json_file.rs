use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

use dyntask_core::{traits::ElementSource, SchedulerError, SchedulerResult, TaskElement};

/// 基于JSON文件的任务元素存储
///
/// 文件内容是一个任务元素数组，文件的mtime作为修改标记。
pub struct JsonFileElementSource {
    path: PathBuf,
}

impl JsonFileElementSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ElementSource for JsonFileElementSource {
    async fn modified_at(&self) -> Option<SystemTime> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.modified().ok(),
            Err(_) => None,
        }
    }

    async fn read_elements(&self) -> SchedulerResult<Vec<TaskElement>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SchedulerError::ElementLoad(format!(
                "读取任务定义文件 {} 失败: {e}",
                self.path.display()
            ))
        })?;

        let elements: Vec<TaskElement> = serde_json::from_str(&content).map_err(|e| {
            SchedulerError::ElementLoad(format!(
                "解析任务定义文件 {} 失败: {e}",
                self.path.display()
            ))
        })?;

        debug!("从 {} 读取了 {} 个任务元素", self.path.display(), elements.len());
        Ok(elements)
    }

    async fn write_back(&self, elements: &[TaskElement]) -> SchedulerResult<()> {
        let content = serde_json::to_string_pretty(elements)
            .map_err(|e| SchedulerError::ElementLoad(format!("序列化任务元素失败: {e}")))?;

        tokio::fs::write(&self.path, content).await.map_err(|e| {
            SchedulerError::ElementLoad(format!(
                "写回任务定义文件 {} 失败: {e}",
                self.path.display()
            ))
        })
    }

    fn purge(&self, element: &mut TaskElement) -> bool {
        // 上一个进程遗留的taskId在重启后已没有对应的调度
        if element.has_task_id() {
            element.task_id = None;
            return true;
        }
        false
    }

    fn merge(&self, cached: &mut Vec<TaskElement>, incoming: &TaskElement) {
        match cached.iter_mut().find(|e| e.id == incoming.id) {
            Some(existing) => *existing = incoming.clone(),
            None => cached.push(incoming.clone()),
        }
    }
}
