use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::RwLock;
use tracing::{debug, info};

use dyntask_core::{traits::ElementSource, SchedulerResult, TaskElement};

/// 缓存的任务元素及最近一次观察到的修改标记
struct LoaderCache {
    elements: Vec<TaskElement>,
    last_modified: Option<SystemTime>,
    loaded: bool,
}

/// 任务元素加载器
///
/// 对外提供后端存储中任务元素的缓存视图：只有在存储的修改标记发生
/// 变化时才重新读取，多个读取方可以并发访问，写回操作（`purge`/
/// `update`）在整个过程中持有写锁，与所有读取方互斥。
pub struct TaskElementLoader {
    source: Arc<dyn ElementSource>,
    cache: RwLock<LoaderCache>,
    reload_count: AtomicU64,
}

impl TaskElementLoader {
    pub fn new(source: Arc<dyn ElementSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(LoaderCache {
                elements: Vec::new(),
                last_modified: None,
                loaded: false,
            }),
            reload_count: AtomicU64::new(0),
        }
    }

    /// 返回经过滤的缓存视图；未提供过滤器时返回空列表
    ///
    /// 首次调用、修改标记变化或标记不可读时先全量重新读取，
    /// 读取失败向上传播而不是返回过期数据。
    pub async fn load<F>(&self, filter: Option<F>) -> SchedulerResult<Vec<TaskElement>>
    where
        F: Fn(&TaskElement) -> bool,
    {
        {
            let cache = self.cache.read().await;
            if !self.needs_reload(&cache).await {
                return Ok(Self::apply_filter(&cache.elements, filter));
            }
        }

        let mut cache = self.cache.write().await;
        // 双重检查，避免等待写锁期间其他调用已完成的重复读取
        if self.needs_reload(&cache).await {
            self.reload(&mut cache).await?;
        }
        Ok(Self::apply_filter(&cache.elements, filter))
    }

    /// 清理缓存中所有元素的无效数据，有修改时写回一次
    pub async fn purge(&self) -> SchedulerResult<()> {
        let mut cache = self.cache.write().await;
        if self.needs_reload(&cache).await {
            self.reload(&mut cache).await?;
        }

        let mut changed = false;
        for element in cache.elements.iter_mut() {
            changed |= self.source.purge(element);
        }

        if changed {
            self.source.write_back(&cache.elements).await?;
            cache.last_modified = self.source.modified_at().await;
            info!("已清理无效任务元素并写回存储");
        }
        Ok(())
    }

    /// 将一组元素合并进缓存并无条件写回
    pub async fn update(&self, incoming: &[TaskElement]) -> SchedulerResult<()> {
        let mut cache = self.cache.write().await;
        if self.needs_reload(&cache).await {
            self.reload(&mut cache).await?;
        }

        for element in incoming {
            self.source.merge(&mut cache.elements, element);
        }

        self.source.write_back(&cache.elements).await?;
        cache.last_modified = self.source.modified_at().await;
        debug!("已合并 {} 个任务元素并写回存储", incoming.len());
        Ok(())
    }

    /// 全量重新读取的累计次数
    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }

    async fn needs_reload(&self, cache: &LoaderCache) -> bool {
        if !cache.loaded {
            return true;
        }
        match (self.source.modified_at().await, cache.last_modified) {
            // 修改标记不可读，宁可多读一次也不使用可能过期的缓存
            (None, _) => true,
            (Some(current), Some(seen)) => current != seen,
            (Some(_), None) => true,
        }
    }

    async fn reload(&self, cache: &mut LoaderCache) -> SchedulerResult<()> {
        // 先采样标记再读内容，读取期间发生的变更会在下次比较中浮现
        let marker = self.source.modified_at().await;
        let elements = self.source.read_elements().await?;
        cache.last_modified = marker;
        debug!("任务元素缓存已重新加载，共 {} 条", elements.len());
        cache.elements = elements;
        cache.loaded = true;
        self.reload_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn apply_filter<F>(elements: &[TaskElement], filter: Option<F>) -> Vec<TaskElement>
    where
        F: Fn(&TaskElement) -> bool,
    {
        match filter {
            Some(filter) => elements.iter().filter(|e| filter(e)).cloned().collect(),
            None => Vec::new(),
        }
    }
}
