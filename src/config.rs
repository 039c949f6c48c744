use dotenv::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::info;

const BUS_NAME: &str = "COMMAND_BUS_NAME";
const FAILURE_POLICY: &str = "COMMAND_BUS_FAILURE_POLICY";

const DEFAULT_BUS_NAME: &str = "command-bus";

/// What a trigger does when one of its listeners fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing listener and return its error
    FailFast,
    /// Invoke every listener, then report all failures together
    #[default]
    ContinueOnError,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::ContinueOnError => "continue_on_error",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "continue_on_error" | "continue" => Ok(FailurePolicy::ContinueOnError),
            other => Err(format!("unknown failure policy: {}", other)),
        }
    }
}

/// Settings for a [`CommandBus`](crate::CommandBus)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandBusConfig {
    /// Name used in log output to tell buses apart
    pub name: String,
    /// Behavior when a listener fails during a trigger
    pub failure_policy: FailurePolicy,
}

impl Default for CommandBusConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BUS_NAME.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl CommandBusConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn from_env() -> CommandBusConfig {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_from_env() -> Result<CommandBusConfig, String> {
        // Load .env file
        dotenv().ok();

        Self::try_from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Missing variables fall back to
    /// the defaults; present but invalid ones are an error.
    pub fn try_from_lookup<F>(lookup: F) -> Result<CommandBusConfig, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup(BUS_NAME)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BUS_NAME.to_string());

        let failure_policy = match lookup(FAILURE_POLICY) {
            Some(raw) => raw
                .parse::<FailurePolicy>()
                .map_err(|err| format!("failed to parse {}: {}", FAILURE_POLICY, err))?,
            None => FailurePolicy::default(),
        };

        info!("Loaded command bus config: name={}, failure_policy={}", name, failure_policy);

        Ok(CommandBusConfig {
            name,
            failure_policy,
        })
    }
}
