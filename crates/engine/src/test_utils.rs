//! 测试辅助：内存任务元素存储、记录调用的调度后端与元素构造器
//!
//! 供本crate的集成测试及下游crate的测试使用。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use dyntask_core::{
    traits::{ElementSource, SchedulerRepository, TaskRunnable, TaskRunnableResolver},
    SchedulerError, SchedulerResult, TaskElement, TaskStatus,
};

/// 构造测试用任务元素
pub struct TaskElementBuilder {
    element: TaskElement,
}

impl TaskElementBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            element: TaskElement::new(
                id.to_string(),
                id.to_string(),
                "0/5 * * * * *".to_string(),
            ),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.element.name = name.to_string();
        self
    }

    pub fn task_id(mut self, task_id: &str) -> Self {
        self.element.task_id = Some(task_id.to_string());
        self
    }

    pub fn profiles(mut self, profiles: &str) -> Self {
        self.element.profiles = profiles.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.element.status = Some(status);
        self
    }

    pub fn expression(mut self, expression: &str) -> Self {
        self.element.expression = expression.to_string();
        self
    }

    pub fn update_sign(mut self, update_sign: i32) -> Self {
        self.element.update_sign = update_sign;
        self
    }

    pub fn build(self) -> TaskElement {
        self.element
    }
}

struct InMemoryState {
    elements: Vec<TaskElement>,
    version: u64,
    read_count: u64,
    write_count: u64,
}

/// 内存任务元素存储
///
/// 修改标记用一个单调递增的版本号模拟，可以显式置为不可读。
pub struct InMemoryElementSource {
    state: Mutex<InMemoryState>,
    marker_unreadable: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryElementSource {
    pub fn new(elements: Vec<TaskElement>) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                elements,
                version: 1,
                read_count: 0,
                write_count: 0,
            }),
            marker_unreadable: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// 替换存储内容并推进修改标记
    pub fn set_elements(&self, elements: Vec<TaskElement>) {
        let mut state = self.state.lock().unwrap();
        state.elements = elements;
        state.version += 1;
    }

    /// 只推进修改标记，内容不变
    pub fn bump_marker(&self) {
        self.state.lock().unwrap().version += 1;
    }

    pub fn set_marker_unreadable(&self, unreadable: bool) {
        self.marker_unreadable.store(unreadable, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn elements(&self) -> Vec<TaskElement> {
        self.state.lock().unwrap().elements.clone()
    }

    pub fn find(&self, id: &str) -> Option<TaskElement> {
        self.elements().into_iter().find(|e| e.id == id)
    }

    pub fn read_count(&self) -> u64 {
        self.state.lock().unwrap().read_count
    }

    pub fn write_count(&self) -> u64 {
        self.state.lock().unwrap().write_count
    }
}

#[async_trait]
impl ElementSource for InMemoryElementSource {
    async fn modified_at(&self) -> Option<SystemTime> {
        if self.marker_unreadable.load(Ordering::SeqCst) {
            return None;
        }
        let version = self.state.lock().unwrap().version;
        Some(UNIX_EPOCH + Duration::from_secs(version))
    }

    async fn read_elements(&self) -> SchedulerResult<Vec<TaskElement>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SchedulerError::ElementLoad("模拟读取失败".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.read_count += 1;
        Ok(state.elements.clone())
    }

    async fn write_back(&self, elements: &[TaskElement]) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.elements = elements.to_vec();
        state.version += 1;
        state.write_count += 1;
        Ok(())
    }

    fn purge(&self, element: &mut TaskElement) -> bool {
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

/// 调度后端收到的调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Register(String),
    Update(String, String),
    Remove(String),
    ScheduleInfo(String),
    Start,
}

struct ArmedTask {
    expression: String,
    runnable: Arc<dyn TaskRunnable>,
}

struct RepoState {
    counter: u64,
    armed: HashMap<String, ArmedTask>,
    calls: Vec<RepoCall>,
}

/// 记录所有调用的内存调度后端
pub struct RecordingRepository {
    state: Mutex<RepoState>,
    fail_register: AtomicBool,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RepoState {
                counter: 0,
                armed: HashMap::new(),
                calls: Vec::new(),
            }),
            fail_register: AtomicBool::new(false),
        }
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn armed_count(&self) -> usize {
        self.state.lock().unwrap().armed.len()
    }

    pub fn armed_expression(&self, task_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .armed
            .get(task_id)
            .map(|t| t.expression.clone())
    }

    /// 取出已注册的执行单元，用于在测试中手动触发
    pub fn runnable(&self, task_id: &str) -> Option<Arc<dyn TaskRunnable>> {
        self.state
            .lock()
            .unwrap()
            .armed
            .get(task_id)
            .map(|t| t.runnable.clone())
    }
}

impl Default for RecordingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerRepository for RecordingRepository {
    async fn register(
        &self,
        expression: &str,
        runnable: Arc<dyn TaskRunnable>,
    ) -> SchedulerResult<String> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("模拟注册失败".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let task_id = format!("task-{}", state.counter);
        state.calls.push(RepoCall::Register(expression.to_string()));
        state.armed.insert(
            task_id.clone(),
            ArmedTask {
                expression: expression.to_string(),
                runnable,
            },
        );
        Ok(task_id)
    }

    async fn update(&self, task_id: &str, expression: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(RepoCall::Update(task_id.to_string(), expression.to_string()));
        match state.armed.get_mut(task_id) {
            Some(task) => {
                task.expression = expression.to_string();
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            }),
        }
    }

    async fn remove(&self, task_id: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RepoCall::Remove(task_id.to_string()));
        match state.armed.remove(task_id) {
            Some(_) => Ok(()),
            None => Err(SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            }),
        }
    }

    async fn schedule_info(&self, task_id: &str) -> SchedulerResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RepoCall::ScheduleInfo(task_id.to_string()));
        Ok(state.armed.get(task_id).map(|t| t.expression.clone()))
    }

    async fn start(&self) -> SchedulerResult<()> {
        self.state.lock().unwrap().calls.push(RepoCall::Start);
        Ok(())
    }
}

/// 计数执行次数的任务单元
pub struct CountingRunnable {
    runs: AtomicU64,
}

impl CountingRunnable {
    pub fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
        }
    }

    pub fn count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Default for CountingRunnable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunnable for CountingRunnable {
    async fn run(&self) -> SchedulerResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 对所有元素返回同一个执行单元的解析器
pub struct StaticResolver {
    runnable: Option<Arc<dyn TaskRunnable>>,
}

impl StaticResolver {
    pub fn with(runnable: Arc<dyn TaskRunnable>) -> Self {
        Self {
            runnable: Some(runnable),
        }
    }

    pub fn noop() -> Self {
        Self::with(Arc::new(CountingRunnable::new()))
    }

    /// 任何解析请求都失败的解析器
    pub fn rejecting() -> Self {
        Self { runnable: None }
    }
}

#[async_trait]
impl TaskRunnableResolver for StaticResolver {
    async fn resolve(&self, element: &TaskElement) -> SchedulerResult<Arc<dyn TaskRunnable>> {
        match &self.runnable {
            Some(runnable) => Ok(runnable.clone()),
            None => Err(SchedulerError::RunnableNotFound(element.name.clone())),
        }
    }
}
