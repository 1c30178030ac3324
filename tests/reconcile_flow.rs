//! 端到端流程：JSON文件数据源 + 协调引擎 + 进程内调度后端
//!
//! 为了确定性，直接驱动引擎的`run`入口，而不是等待定时器触发。

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;

use dyntask_core::{
    traits::{SchedulerRepository, TaskRunnable},
    EngineConfig, SchedulerResult, TaskElement, TaskStatus,
};
use dyntask_engine::scheduler::{STATUS_NOT_ACTIVATED, STATUS_RUNNING, STATUS_STOPPED};
use dyntask_engine::{
    DatasourceScheduler, EnginePhase, LoaderTaskElementsOperation, TaskElementLoader,
};
use dyntask_infrastructure::{
    JsonFileElementSource, LocalSchedulerRepository, RunnableRegistry,
};

struct ReportRunnable {
    runs: AtomicU64,
}

#[async_trait]
impl TaskRunnable for ReportRunnable {
    async fn run(&self) -> SchedulerResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn element(id: &str, name: &str, status: Option<TaskStatus>) -> TaskElement {
    let mut e = TaskElement::new(id.to_string(), name.to_string(), "0/5 * * * * *".to_string());
    e.status = status;
    e
}

fn read_tasks(path: &Path) -> Vec<TaskElement> {
    let content = std::fs::read_to_string(path).expect("读取任务文件失败");
    serde_json::from_str(&content).expect("解析任务文件失败")
}

fn find<'a>(elements: &'a [TaskElement], id: &str) -> &'a TaskElement {
    elements
        .iter()
        .find(|e| e.id == id)
        .unwrap_or_else(|| panic!("记录 {id} 不存在"))
}

/// 写任务文件并显式设置递增的mtime，避免文件系统时间精度影响变更检测
fn write_tasks(path: &Path, elements: &[TaskElement], edit_seq: &mut u64) {
    let content = serde_json::to_string_pretty(elements).expect("序列化失败");
    std::fs::write(path, content).expect("写入任务文件失败");

    *edit_seq += 1;
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("打开任务文件失败");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_000_000 + *edit_seq))
        .expect("设置mtime失败");
}

#[tokio::test]
async fn test_full_reconcile_flow() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let tasks_path = dir.path().join("tasks.json");
    let mut edit_seq = 0u64;

    write_tasks(
        &tasks_path,
        &[
            element("r1", "report", Some(TaskStatus::Active)),
            element("r2", "report", Some(TaskStatus::Paused)),
        ],
        &mut edit_seq,
    );

    let report = Arc::new(ReportRunnable {
        runs: AtomicU64::new(0),
    });
    let registry = Arc::new(RunnableRegistry::new());
    registry.register("report", report.clone()).await;

    let source = Arc::new(JsonFileElementSource::new(&tasks_path));
    let loader = Arc::new(TaskElementLoader::new(source));
    let operation = Arc::new(LoaderTaskElementsOperation::new(loader));
    let repository = Arc::new(LocalSchedulerRepository::new());
    let engine = DatasourceScheduler::new(
        operation,
        repository.clone(),
        registry,
        EngineConfig {
            manager_expression: "0/30 * * * * *".to_string(),
            ..EngineConfig::default()
        },
    );

    // 启动：r1注册，r2跳过，管理任务自注册
    engine.init().await.expect("初始化失败");
    engine.start().await.expect("启动失败");

    let stored = read_tasks(&tasks_path);
    let r1_task_id = find(&stored, "r1").task_id.clone().expect("r1未注册");
    assert_eq!(
        find(&stored, "r1").status_description.as_deref(),
        Some(STATUS_RUNNING)
    );
    assert!(!find(&stored, "r2").has_task_id());
    assert_eq!(
        find(&stored, "r2").status_description.as_deref(),
        Some(STATUS_NOT_ACTIVATED)
    );

    let manager_task_id = engine.manager_task_id().await.expect("管理任务未注册");
    assert_eq!(
        repository
            .schedule_info(&manager_task_id)
            .await
            .expect("查询失败")
            .as_deref(),
        Some("0/30 * * * * *")
    );

    // 表达式变更
    let mut edited = read_tasks(&tasks_path);
    {
        let r1 = edited.iter_mut().find(|e| e.id == "r1").expect("r1丢失");
        r1.expression = "0/10 * * * * *".to_string();
        r1.update_sign = 1;
    }
    write_tasks(&tasks_path, &edited, &mut edit_seq);

    engine.run().await.expect("协调失败");

    assert_eq!(
        repository
            .schedule_info(&r1_task_id)
            .await
            .expect("查询失败")
            .as_deref(),
        Some("0/10 * * * * *")
    );
    assert_eq!(find(&read_tasks(&tasks_path), "r1").update_sign, 0);

    // 暂停
    let mut edited = read_tasks(&tasks_path);
    {
        let r1 = edited.iter_mut().find(|e| e.id == "r1").expect("r1丢失");
        r1.status = Some(TaskStatus::Paused);
        r1.update_sign = 1;
    }
    write_tasks(&tasks_path, &edited, &mut edit_seq);

    engine.run().await.expect("协调失败");

    let stored = read_tasks(&tasks_path);
    assert!(!find(&stored, "r1").has_task_id());
    assert_eq!(
        find(&stored, "r1").status_description.as_deref(),
        Some(STATUS_STOPPED)
    );
    assert_eq!(
        repository.schedule_info(&r1_task_id).await.expect("查询失败"),
        None
    );

    // 恢复
    let mut edited = read_tasks(&tasks_path);
    {
        let r1 = edited.iter_mut().find(|e| e.id == "r1").expect("r1丢失");
        r1.status = Some(TaskStatus::Active);
        r1.update_sign = 1;
    }
    write_tasks(&tasks_path, &edited, &mut edit_seq);

    engine.run().await.expect("协调失败");

    let resumed_task_id = find(&read_tasks(&tasks_path), "r1")
        .task_id
        .clone()
        .expect("r1未重新注册");
    assert_ne!(resumed_task_id, r1_task_id);

    // 停止：后端清空，存储中的taskId清理
    engine.stop().await.expect("停止失败");
    assert_eq!(engine.phase().await, EnginePhase::Stopped);
    assert_eq!(
        repository
            .schedule_info(&resumed_task_id)
            .await
            .expect("查询失败"),
        None
    );
    assert_eq!(
        repository
            .schedule_info(&manager_task_id)
            .await
            .expect("查询失败"),
        None
    );
    assert!(read_tasks(&tasks_path).iter().all(|e| !e.has_task_id()));

    // 本测试不启动后端定时器，执行单元不应被触发过
    assert_eq!(report.runs.load(Ordering::SeqCst), 0);
}
