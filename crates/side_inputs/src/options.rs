//! src/options.rs
//!
//! Runtime options and experiment flags.
//!
//! Options are set once per worker lifecycle and read many times. A process-wide
//! instance is available through `RuntimeOptions::global()`, but every merger
//! takes its options through `MergerConfig`, so tests can inject an isolated
//! instance instead of touching shared state.
//!
//! The `experiments` option holds either a comma-separated string
//! (`"sideinput_io_metrics,other"`) or a JSON list of strings.

use crate::error::SideInputError;
use anyhow::Result;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Experiment that turns on bytes-read reporting for side-input reads.
pub const SIDEINPUT_IO_METRICS_EXPERIMENT: &str = "sideinput_io_metrics";

/// Option key holding the enabled experiments.
pub const EXPERIMENTS_OPTION: &str = "experiments";

static GLOBAL_OPTIONS: OnceLock<Arc<RuntimeOptions>> = OnceLock::new();

/// Settable-then-readable key/value runtime configuration.
#[derive(Debug, Default)]
pub struct RuntimeOptions {
    options: RwLock<HashMap<String, Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExperimentsValue {
    Joined(String),
    List(Vec<String>),
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide options shared by mergers that were not given their own.
    pub fn global() -> Arc<RuntimeOptions> {
        GLOBAL_OPTIONS
            .get_or_init(|| Arc::new(RuntimeOptions::new()))
            .clone()
    }

    /// Creates options pre-populated with the given experiments.
    pub fn with_experiments<I, S>(experiments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<Value> = experiments
            .into_iter()
            .map(|e| Value::String(e.into()))
            .collect();
        let options = Self::new();
        options.set(EXPERIMENTS_OPTION, Value::Array(list));
        options
    }

    /// Replaces all options.
    pub fn set_runtime_options(&self, options: HashMap<String, Value>) {
        *self.options.write() = options;
    }

    /// Replaces all options with the fields of a JSON object.
    pub fn set_from_json(&self, json: &str) -> Result<()> {
        let parsed: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| SideInputError::InvalidOptions(e.to_string()))?;
        self.set_runtime_options(parsed.into_iter().collect());
        Ok(())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.options.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.options.read().get(key).cloned()
    }

    /// Clears every option. Used between tests and worker invocations.
    pub fn reset(&self) {
        self.options.write().clear();
    }

    /// Enabled experiments, in declaration order, with empty tokens dropped.
    ///
    /// Tokens are taken verbatim: `"a, b"` enables `"a"` and `" b"`.
    pub fn experiments(&self) -> Vec<String> {
        let Some(raw) = self.get(EXPERIMENTS_OPTION) else {
            return Vec::new();
        };

        match serde_json::from_value::<ExperimentsValue>(raw) {
            Ok(ExperimentsValue::Joined(joined)) => joined
                .split(',')
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect(),
            Ok(ExperimentsValue::List(list)) => {
                list.into_iter().filter(|e| !e.is_empty()).collect()
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed '{}' option: {}", EXPERIMENTS_OPTION, e);
                Vec::new()
            }
        }
    }

    pub fn has_experiment(&self, experiment: &str) -> bool {
        self.experiments().iter().any(|e| e == experiment)
    }

    /// Whether side-input reads should report bytes read.
    pub fn side_input_io_metrics_enabled(&self) -> bool {
        self.has_experiment(SIDEINPUT_IO_METRICS_EXPERIMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comma_separated_experiments() {
        let options = RuntimeOptions::new();
        options.set(EXPERIMENTS_OPTION, json!("sideinput_io_metrics,other,"));

        assert_eq!(options.experiments(), vec!["sideinput_io_metrics", "other"]);
        assert!(options.side_input_io_metrics_enabled());
        assert!(!options.has_experiment("sideinput"));
    }

    #[test]
    fn test_experiment_tokens_match_exactly() {
        let options = RuntimeOptions::new();
        options.set(EXPERIMENTS_OPTION, json!("other, sideinput_io_metrics"));

        assert_eq!(options.experiments(), vec!["other", " sideinput_io_metrics"]);
        assert!(!options.side_input_io_metrics_enabled());

        options.set(EXPERIMENTS_OPTION, json!([" sideinput_io_metrics "]));
        assert!(!options.side_input_io_metrics_enabled());
    }

    #[test]
    fn test_list_experiments_and_reset() {
        let options = RuntimeOptions::with_experiments(["a", SIDEINPUT_IO_METRICS_EXPERIMENT]);
        assert!(options.side_input_io_metrics_enabled());

        options.reset();
        assert!(options.experiments().is_empty());
        assert!(!options.side_input_io_metrics_enabled());
    }

    #[test]
    fn test_set_from_json() -> Result<()> {
        let options = RuntimeOptions::new();
        options.set_from_json(r#"{"experiments": "x,sideinput_io_metrics", "job": "j1"}"#)?;

        assert!(options.side_input_io_metrics_enabled());
        assert_eq!(options.get("job"), Some(json!("j1")));

        // Replaces rather than merges
        options.set_from_json(r#"{"job": "j2"}"#)?;
        assert!(!options.side_input_io_metrics_enabled());

        assert!(options.set_from_json("[1, 2]").is_err());
        Ok(())
    }

    #[test]
    fn test_malformed_experiments_are_ignored() {
        let options = RuntimeOptions::new();
        options.set(EXPERIMENTS_OPTION, json!(42));
        assert!(options.experiments().is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&RuntimeOptions::global(), &RuntimeOptions::global()));
    }
}
