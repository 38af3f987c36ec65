use cadence_core::{CadenceError, Llm, Result};
use regex::Regex;
use std::sync::Arc;

type LlmFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Llm>> + Send + Sync>;

/// Maps model-name patterns to adapter factories.
///
/// Constructed once at process start and passed by reference to whatever
/// needs model resolution; there is deliberately no global instance, so
/// tests build isolated registries.
pub struct LlmRegistry {
    entries: Vec<(Regex, LlmFactory)>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a factory for model names matching `pattern` (anchored).
    pub fn register<F>(&mut self, pattern: &str, factory: F) -> Result<()>
    where
        F: Fn(&str) -> Result<Arc<dyn Llm>> + Send + Sync + 'static,
    {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| CadenceError::Config(format!("invalid model pattern {pattern}: {e}")))?;
        self.entries.push((regex, Box::new(factory)));
        Ok(())
    }

    /// Resolve a model name against registered patterns, first match wins.
    pub fn resolve(&self, model_name: &str) -> Result<Arc<dyn Llm>> {
        for (regex, factory) in &self.entries {
            if regex.is_match(model_name) {
                return factory(model_name);
            }
        }
        Err(CadenceError::Config(format!("no model registered for name: {model_name}")))
    }
}

impl Default for LlmRegistry {
    fn default() -> Self {
        Self::new()
    }
}
