use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub source: SourceConfig,
}

/// 协调引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 管理任务在数据源中的标识
    pub manager_id: String,
    /// 数据源中没有管理任务时自注册使用的调度表达式
    pub manager_expression: String,
    /// 当前进程生效的环境标签
    pub active_profiles: Vec<String>,
}

/// 任务元素数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 任务定义文件路径
    pub path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manager_id: "dyntask-manager".to_string(),
            manager_expression: "0/10 * * * * *".to_string(),
            active_profiles: vec!["default".to_string()],
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: "config/tasks.json".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.manager_id.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "管理任务标识不能为空".to_string(),
            ));
        }

        if self.manager_expression.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "管理任务的调度表达式不能为空".to_string(),
            ));
        }

        if self.active_profiles.iter().any(|p| p.trim().is_empty()) {
            return Err(SchedulerError::Configuration(
                "环境标签不能为空白".to_string(),
            ));
        }

        Ok(())
    }
}

impl SourceConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.path.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "任务定义文件路径不能为空".to_string(),
            ));
        }

        Ok(())
    }
}

impl AppConfig {
    /// 加载配置：默认值 <- 配置文件 <- DYNTASK_前缀环境变量
    pub fn load(config_path: Option<&str>) -> SchedulerResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("DYNTASK")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("engine.active_profiles"),
        );

        let loaded = builder
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("读取配置失败: {e}")))?;

        let app: AppConfig = loaded
            .try_deserialize()
            .map_err(|e| SchedulerError::Configuration(format!("解析配置失败: {e}")))?;

        app.validate()?;
        Ok(app)
    }

    /// 从TOML文本解析配置
    pub fn from_toml(content: &str) -> SchedulerResult<Self> {
        let app: AppConfig = toml::from_str(content)
            .map_err(|e| SchedulerError::Configuration(format!("TOML解析失败: {e}")))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        self.engine.validate()?;
        self.source.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.manager_id, "dyntask-manager");
        assert_eq!(config.engine.manager_expression, "0/10 * * * * *");
        assert_eq!(config.engine.active_profiles, vec!["default".to_string()]);
        assert_eq!(config.source.path, "config/tasks.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(
            r#"
            [engine]
            manager_id = "mgr"
            active_profiles = ["prod", "staging"]

            [source]
            path = "/var/lib/dyntask/tasks.json"
            "#,
        )
        .expect("解析失败");

        assert_eq!(config.engine.manager_id, "mgr");
        // 未出现的键保留默认值
        assert_eq!(config.engine.manager_expression, "0/10 * * * * *");
        assert_eq!(
            config.engine.active_profiles,
            vec!["prod".to_string(), "staging".to_string()]
        );
        assert_eq!(config.source.path, "/var/lib/dyntask/tasks.json");
    }

    #[test]
    fn test_validation_rejects_blank_manager_id() {
        let result = AppConfig::from_toml(
            r#"
            [engine]
            manager_id = "  "
            "#,
        );
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }

    #[test]
    fn test_validation_rejects_blank_source_path() {
        let mut config = AppConfig::default();
        config.source.path = String::new();
        assert!(config.validate().is_err());
    }

    // 环境变量是进程级状态，三段加载流程放在同一个用例里顺序执行
    #[test]
    fn test_load_precedence() {
        // 文件缺失时使用默认值
        let config = AppConfig::load(Some("/nonexistent/dyntask.toml")).expect("加载失败");
        assert_eq!(config.engine.manager_id, "dyntask-manager");

        // 配置文件覆盖默认值
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("创建临时文件失败");
        writeln!(
            file,
            "[engine]\nmanager_id = \"from-file\"\n\n[source]\npath = \"tasks.json\""
        )
        .expect("写入失败");

        let path = file.path().to_string_lossy().to_string();
        let config = AppConfig::load(Some(&path)).expect("加载失败");
        assert_eq!(config.engine.manager_id, "from-file");
        assert_eq!(config.source.path, "tasks.json");

        // 环境变量覆盖配置文件
        std::env::set_var("DYNTASK_ENGINE__MANAGER_ID", "from-env");
        let config = AppConfig::load(Some(&path)).expect("加载失败");
        std::env::remove_var("DYNTASK_ENGINE__MANAGER_ID");
        assert_eq!(config.engine.manager_id, "from-env");
        assert_eq!(config.source.path, "tasks.json");
    }
}
