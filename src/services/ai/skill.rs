//! Skills: server-side functions the model can call as tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{FunctionDef, Tool};

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Skill: Send + Sync {
    /// Function name exposed to the model.
    fn name(&self) -> &str;

    /// What the skill does, phrased for the model.
    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value, SkillError>;

    fn is_enabled(&self) -> bool;
}

/// Skills keyed by name.
#[derive(Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `skill`, replacing any skill with the same name.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    /// Enabled skill called `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills
            .get(name)
            .filter(|skill| skill.is_enabled())
            .cloned()
    }

    /// Enabled skills ordered by name.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<dyn Skill>> {
        self.skills.values().filter(|skill| skill.is_enabled())
    }

    /// Tool definitions for every enabled skill.
    pub fn tools(&self) -> Vec<Tool> {
        self.enabled()
            .map(|skill| Tool {
                kind: "function",
                function: FunctionDef {
                    name: skill.name().to_string(),
                    description: skill.description().to_string(),
                    parameters: skill.parameters(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed {
        name: &'static str,
        enabled: bool,
    }

    #[async_trait]
    impl Skill for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _args: Value) -> Result<Value, SkillError> {
            Ok(json!(self.name))
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    fn registry() -> SkillRegistry {
        let mut registry = SkillRegistry::new();
        for (name, enabled) in [("zeta", true), ("alpha", true), ("off", false)] {
            registry.register(Arc::new(Fixed { name, enabled }));
        }
        registry
    }

    #[test]
    fn tools_list_enabled_skills_by_name() {
        let names: Vec<_> = registry()
            .tools()
            .into_iter()
            .map(|tool| tool.function.name)
            .collect();

        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn disabled_skills_are_not_callable() {
        let registry = registry();

        assert!(registry.get("off").is_none());
        let alpha = registry.get("alpha").unwrap();
        assert_eq!(alpha.execute(json!({})).await.unwrap(), json!("alpha"));
    }
}
