//! LLM agent collaborator: structured prompts in, JSON out

use crate::error::UnderstoryError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A prompt plus the JSON schema the reply must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    /// Short identifier for the output shape, e.g. `search_plan`.
    pub schema_name: String,
    pub schema: Value,
    pub system: String,
    pub prompt: String,
}

impl AgentRequest {
    pub fn new(schema_name: impl Into<String>, schema: Value, prompt: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            schema,
            system: String::new(),
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

/// Returns a JSON value conforming to the request's schema, or fails after
/// the backend's own retries are exhausted.
pub trait Agent: Send + Sync {
    fn complete(&self, request: &AgentRequest) -> Result<Value>;
}

impl<T: Agent + ?Sized> Agent for &T {
    fn complete(&self, request: &AgentRequest) -> Result<Value> {
        (**self).complete(request)
    }
}

impl<T: Agent + ?Sized> Agent for std::sync::Arc<T> {
    fn complete(&self, request: &AgentRequest) -> Result<Value> {
        (**self).complete(request)
    }
}

/// Run `request` and decode the reply into `T`.
pub fn complete_typed<T, A>(agent: &A, request: &AgentRequest) -> Result<T>
where
    T: DeserializeOwned,
    A: Agent + ?Sized,
{
    let value = agent.complete(request)?;
    serde_json::from_value(value).map_err(|e| {
        UnderstoryError::Agent(format!(
            "reply does not match schema '{}': {e}",
            request.schema_name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Fixed(Value);

    impl Agent for Fixed {
        fn complete(&self, _request: &AgentRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Plan {
        files: Vec<String>,
    }

    #[test]
    fn decodes_typed_replies() {
        let agent = Fixed(json!({"files": ["a.py"]}));
        let request = AgentRequest::new("plan", json!({"type": "object"}), "go");
        let plan: Plan = complete_typed(&agent, &request).unwrap();
        assert_eq!(plan.files, vec!["a.py".to_string()]);
    }

    #[test]
    fn schema_mismatch_is_an_agent_error() {
        let agent = Fixed(json!({"unexpected": true}));
        let request = AgentRequest::new("plan", json!({}), "go");
        let err = complete_typed::<Plan, _>(&agent, &request).unwrap_err();
        assert!(matches!(err, UnderstoryError::Agent(_)));
        assert!(err.to_string().contains("plan"));
    }
}
