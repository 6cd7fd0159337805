use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Process exit code: 0 for success, 1 for user errors, 2 for failures.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        self.details
            .as_object()
            .and_then(|map| map.get("hint"))
            .and_then(Value::as_str)
    }

    /// Envelope printed by `--json`.
    pub fn to_json_response(&self) -> Value {
        let status = match self.status {
            CommandStatus::Ok => "ok",
            CommandStatus::UserError => "user-error",
            CommandStatus::Failure => "error",
        };
        let details = match &self.details {
            Value::Object(_) => self.details.clone(),
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };
        json!({
            "status": status,
            "message": format_status_message(&self.message),
            "details": details,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

pub fn format_status_message(message: &str) -> String {
    const PREFIX: &str = "modelsync";
    if message.is_empty() {
        PREFIX.to_string()
    } else if message.starts_with(PREFIX) {
        message.to_string()
    } else {
        format!("{PREFIX}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope_wraps_non_object_details() {
        let outcome = ExecutionOutcome::failure("boom", json!("raw"));
        let payload = outcome.to_json_response();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["message"], "modelsync: boom");
        assert_eq!(payload["details"]["value"], "raw");
        assert_eq!(outcome.exit_code(), 2);
    }

    #[test]
    fn hint_is_read_from_details() {
        let outcome =
            ExecutionOutcome::user_error("bad url", json!({"hint": "copy the model page link"}));
        assert_eq!(outcome.hint(), Some("copy the model page link"));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            ExecutionOutcome::success("", Value::Null).to_json_response()["details"],
            json!({})
        );
    }
}
