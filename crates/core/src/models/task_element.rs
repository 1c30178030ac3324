use serde::{Deserialize, Serialize};

/// 任务元素
///
/// 数据源中一行任务定义的内存表示，是协调引擎的基本处理单元。
///
/// # 字段说明
///
/// - `id`: 数据源分配的稳定标识，创建后不会变更
/// - `task_id`: 注册到调度后端后返回的标识，空缺表示当前未注册
/// - `name`: 任务名称，同时作为执行单元的查找键
/// - `description`: 任务描述
/// - `profiles`: 任务允许运行的环境标签，逗号分隔，空串表示不限环境
/// - `status`: 期望的运行状态（ACTIVE/PAUSED）
/// - `status_description`: 最近一次注册决策的文字说明
/// - `expression`: 调度后端可识别的调度表达式
/// - `update_sign`: 脏标志，1表示该记录的变更尚未应用到调度后端
///
/// # 使用示例
///
/// ```rust
/// use dyntask_core::models::{TaskElement, TaskStatus};
///
/// let element = TaskElement {
///     id: "backup-1".to_string(),
///     task_id: None,
///     name: "backup".to_string(),
///     description: "数据备份".to_string(),
///     profiles: "prod".to_string(),
///     status: Some(TaskStatus::Active),
///     status_description: None,
///     expression: "0 2 * * * *".to_string(),
///     update_sign: 0,
/// };
/// assert!(element.is_after_insert());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskElement {
    pub id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profiles: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub status_description: Option<String>,
    pub expression: String,
    #[serde(default)]
    pub update_sign: i32,
}

/// 任务期望状态
///
/// 数据源中status列的取值。`ACTIVE`和`PAUSED`之外的任何取值都归入
/// `Other`，在所有判定中按"非激活"处理，序列化时原样写回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Active,
    Paused,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Other(value) => value,
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        match value {
            "ACTIVE" => TaskStatus::Active,
            "PAUSED" => TaskStatus::Paused,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(TaskStatus::from(value.as_str()))
    }
}

impl TaskElement {
    /// 创建一个尚未注册的新任务元素
    pub fn new(id: String, name: String, expression: String) -> Self {
        Self {
            id,
            task_id: None,
            name,
            description: String::new(),
            profiles: String::new(),
            status: None,
            status_description: None,
            expression,
            update_sign: 0,
        }
    }

    /// 是否持有调度后端分配的标识（空串视为空缺）
    pub fn has_task_id(&self) -> bool {
        self.task_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// 状态存在且不是ACTIVE（未知状态也按非激活处理）
    pub fn is_inactive(&self) -> bool {
        matches!(&self.status, Some(status) if *status != TaskStatus::Active)
    }

    /// 已注册且期望状态为PAUSED，下次协调时应当移除调度
    pub fn will_be_paused(&self) -> bool {
        self.has_task_id() && self.status == Some(TaskStatus::Paused)
    }

    /// 未注册且期望状态为ACTIVE，下次协调时应当注册
    pub fn will_be_active(&self) -> bool {
        !self.has_task_id() && self.status == Some(TaskStatus::Active)
    }

    /// 新插入的记录：未注册、无未应用变更、状态空缺或ACTIVE
    pub fn is_after_insert(&self) -> bool {
        !self.has_task_id()
            && self.update_sign == 0
            && matches!(&self.status, None | Some(TaskStatus::Active))
    }

    /// 记录存在尚未应用的变更
    pub fn is_after_update(&self) -> bool {
        self.update_sign == 1
    }

    /// 当前表达式与已注册的表达式不一致
    pub fn expression_changed(&self, armed: Option<&str>) -> bool {
        matches!(armed, Some(value) if value != self.expression)
    }
}
