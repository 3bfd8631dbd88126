use uuid::Uuid;

use crate::error::{AgentscopeError, Result};

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_span_id() -> String {
    Uuid::new_v4().to_string()
}

/// Project secrets look like `sk_0123456789abcdef`.
pub fn new_api_key() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("sk_{}", &hex[..16])
}

pub fn validate_project_id(input: &str) -> Result<()> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AgentscopeError::InvalidArgument(
            "project id cannot be empty".to_string(),
        ));
    }
    if trimmed.len() > 128 || trimmed.chars().any(char::is_control) {
        return Err(AgentscopeError::InvalidArgument(format!(
            "invalid project id: {input}"
        )));
    }
    Ok(())
}
