use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// 0 disables the turn limit.
    pub max_turns: u64,
    /// 0 disables the token limit.
    pub max_tokens: u64,
    pub subscribe_mode: SubscribeMode,
    /// Tool steps between two watcher reviews of a running agent; 0 disables.
    #[serde(default = "default_watch_interval")]
    pub watch_interval: usize,
}

fn default_watch_interval() -> usize {
    crate::traits::DEFAULT_WATCH_INTERVAL
}

/// How the team's subscription edges are derived at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeMode {
    /// Leader-centric when a leader exists, otherwise all-to-all.
    #[default]
    Default,
    Leader,
    All,
    Custom,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub feedback_reset_threshold: usize,
    pub use_function_call: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("TEAMFLOW_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map TEAMFLOW__SCHEDULER__MAX_TURNS=30 to scheduler.max_turns
            .add_source(Environment::with_prefix("TEAMFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_tokens: 0,
            subscribe_mode: SubscribeMode::Default,
            watch_interval: default_watch_interval(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            feedback_reset_threshold: 5,
            use_function_call: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,teamflow=debug".into(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            agent: AgentConfig::default(),
            memory: MemoryConfig { window: 0 },
            logging: LoggingConfig::default(),
        }
    }
}
