use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dyntask_core::{
    traits::{SchedulerRepository, TaskRunnable},
    SchedulerError, SchedulerResult,
};

/// 单个已注册的调度任务
struct ScheduledTask {
    expression: String,
    runnable: Arc<dyn TaskRunnable>,
    shutdown: watch::Sender<bool>,
}

/// 进程内调度后端
///
/// 每个注册的任务对应一个tokio定时循环。循环先等待`start`发出的
/// 信号，之后按CRON表达式逐次触发执行单元；同一标识同时至多有一个
/// 活动循环。
pub struct LocalSchedulerRepository {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    started: watch::Sender<bool>,
}

impl LocalSchedulerRepository {
    pub fn new() -> Self {
        let (started, _) = watch::channel(false);
        Self {
            tasks: Mutex::new(HashMap::new()),
            started,
        }
    }

    fn parse_expression(expression: &str) -> SchedulerResult<Schedule> {
        Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron {
            expr: expression.to_string(),
            message: e.to_string(),
        })
    }

    fn spawn_loop(
        &self,
        task_id: String,
        schedule: Schedule,
        runnable: Arc<dyn TaskRunnable>,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started_rx = self.started.subscribe();
        tokio::spawn(run_schedule_loop(
            task_id,
            schedule,
            runnable,
            started_rx,
            shutdown_rx,
        ));
        shutdown_tx
    }
}

impl Default for LocalSchedulerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerRepository for LocalSchedulerRepository {
    async fn register(
        &self,
        expression: &str,
        runnable: Arc<dyn TaskRunnable>,
    ) -> SchedulerResult<String> {
        let schedule = Self::parse_expression(expression)?;
        let task_id = Uuid::new_v4().to_string();
        let shutdown = self.spawn_loop(task_id.clone(), schedule, runnable.clone());

        let mut tasks = self.tasks.lock().await;
        tasks.insert(
            task_id.clone(),
            ScheduledTask {
                expression: expression.to_string(),
                runnable,
                shutdown,
            },
        );
        info!("已注册调度任务 {task_id}: {expression}");
        Ok(task_id)
    }

    async fn update(&self, task_id: &str, expression: &str) -> SchedulerResult<()> {
        let schedule = Self::parse_expression(expression)?;

        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(task_id).ok_or_else(|| SchedulerError::TaskNotFound {
            id: task_id.to_string(),
        })?;

        // 先让旧循环退出再挂新循环，保证同一标识只有一个活动定时器
        let _ = task.shutdown.send(true);
        task.shutdown = self.spawn_loop(task_id.to_string(), schedule, task.runnable.clone());
        task.expression = expression.to_string();
        info!("调度任务 {task_id} 的表达式已更新为 {expression}");
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.remove(task_id).ok_or_else(|| SchedulerError::TaskNotFound {
            id: task_id.to_string(),
        })?;
        let _ = task.shutdown.send(true);
        debug!("已移除调度任务 {task_id}");
        Ok(())
    }

    async fn schedule_info(&self, task_id: &str) -> SchedulerResult<Option<String>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.get(task_id).map(|t| t.expression.clone()))
    }

    async fn start(&self) -> SchedulerResult<()> {
        let _ = self.started.send(true);
        info!("调度后端已启动，共 {} 个任务", self.tasks.lock().await.len());
        Ok(())
    }
}

async fn run_schedule_loop(
    task_id: String,
    schedule: Schedule,
    runnable: Arc<dyn TaskRunnable>,
    mut started: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    // 等待后端的启动信号
    while !*started.borrow() {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            changed = started.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let Some(next) = schedule.after(&now).next() else {
            warn!("任务 {task_id} 没有后续触发时间，调度循环退出");
            break;
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                debug!("触发调度任务 {task_id}");
                if let Err(e) = runnable.run().await {
                    error!("调度任务 {task_id} 执行失败: {e}");
                }
            }
            _ = shutdown.changed() => {}
        }
    }
    debug!("调度任务 {task_id} 的循环已退出");
}
