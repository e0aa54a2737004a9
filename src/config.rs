//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SLEUTH__*` 覆盖（双下划线表示嵌套，
//! 如 `SLEUTH__LLM__MODEL=gpt-4o-mini`）。外部智能体在 [[agents]] 表中静态声明，
//! 启动注册后不可变。

use std::path::PathBuf;

use serde::Deserialize;

use crate::proto::Endpoint;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    /// 外部智能体声明；启动时逐个建连并枚举工具
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// [app] 段：应用名、数据目录、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 历史落盘目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

fn default_max_context_turns() -> usize {
    20
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退 OPENAI_API_KEY 环境变量
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [orchestrator] 段：迭代上限与单次智能体调用的工具步数上限
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 整个计划循环的最大迭代次数（生成-确认-执行-校验为一次迭代）
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 单个智能体调用内部的工具调用步数上限，防死循环
    #[serde(default = "default_max_agent_steps")]
    pub max_agent_steps: usize,
}

fn default_max_iterations() -> usize {
    5
}

fn default_max_agent_steps() -> usize {
    8
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_agent_steps: default_max_agent_steps(),
        }
    }
}

/// [artifacts] 段：生成构件（仪表盘/报告/组件）的根目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArtifactsSection {
    /// 未设置时用当前目录，下设 generated_dashboards 等分类子目录
    pub root_dir: Option<PathBuf>,
}

/// [gateway] 段：WebSocket 与 HTTP 监听地址、会话超时
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

fn default_ws_addr() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_http_addr() -> String {
    "127.0.0.1:9001".to_string()
}

fn default_session_timeout() -> u64 {
    3600
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            ws_addr: default_ws_addr(),
            http_addr: default_http_addr(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

/// [[agents]] 表：单个外部智能体的静态声明
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// 领域类别（如 Database、Search）
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// 使用提示，嵌入 Planner 的智能体目录
    #[serde(default)]
    pub usage: String,
    /// 领域专属规则文本，嵌入该智能体的 system prompt
    #[serde(default)]
    pub rules: String,
    /// url 或 command+args，二选一
    #[serde(flatten)]
    pub endpoint: Endpoint,
}

fn default_category() -> String {
    "Others".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            orchestrator: OrchestratorSection::default(),
            artifacts: ArtifactsSection::default(),
            gateway: GatewaySection::default(),
            agents: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SLEUTH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SLEUTH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SLEUTH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
