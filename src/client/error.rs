//! Mapping of HTTP error responses onto [`Error`].

use serde::Deserialize;
use serde_json::Value;

use crate::Error;

/// Error body shapes the platform is known to return.
///
/// `{"error": {"code", "message"}}`, `{"error": "..."}`, `{"detail": ...}`
/// and `{"message": "..."}` all occur, sometimes inside the
/// `{"success": false, ...}` envelope.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

impl ErrorResponse {
    pub(crate) fn parse(body: &str) -> (Option<String>, String) {
        let trimmed = body.trim();
        let parsed = serde_json::from_str::<ErrorResponse>(trimmed).ok();
        match parsed {
            Some(resp) => resp.code_and_message(trimmed),
            None if trimmed.is_empty() => (None, "no response body".to_string()),
            None => (None, trimmed.to_string()),
        }
    }

    fn code_and_message(self, raw: &str) -> (Option<String>, String) {
        let mut code = self.code.as_ref().and_then(value_text);
        let mut message = self.message;

        match self.error {
            Some(Value::Object(obj)) => {
                code = code.or_else(|| obj.get("code").and_then(value_text));
                message = message.or_else(|| obj.get("message").and_then(value_text));
            }
            Some(Value::String(text)) => message = message.or(Some(text)),
            _ => {}
        }

        if message.is_none()
            && let Some(detail) = self.detail
        {
            message = Some(match detail {
                Value::String(text) => text,
                other => other.to_string(),
            });
        }

        (code, message.unwrap_or_else(|| raw.to_string()))
    }

    pub(crate) fn into_error(status: u16, body: &str) -> Error {
        let (code, message) = Self::parse(body);
        match status {
            401 => Error::Authentication(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            _ => Error::Backend {
                status: Some(status),
                code,
                message,
            },
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Strips the `{"success": ..., "data": ...}` envelope from a 2xx body.
pub(crate) fn unwrap_envelope(status: u16, value: Value) -> crate::Result<Value> {
    let Value::Object(mut obj) = value else {
        return Ok(value);
    };
    match obj.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(obj.remove("data").unwrap_or(Value::Null)),
        Some(false) => {
            let body = Value::Object(obj).to_string();
            let (code, message) = ErrorResponse::parse(&body);
            Err(Error::Backend {
                status: Some(status),
                code,
                message,
            })
        }
        None => Ok(Value::Object(obj)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ErrorResponse::into_error(401, r#"{"detail":"bad key"}"#),
            Error::Authentication(m) if m == "bad key"
        ));
        assert!(matches!(
            ErrorResponse::into_error(403, "nope"),
            Error::Forbidden(_)
        ));
        assert!(ErrorResponse::into_error(404, "").is_not_found());
        assert!(matches!(
            ErrorResponse::into_error(409, r#"{"message":"name taken"}"#),
            Error::Conflict(m) if m == "name taken"
        ));
    }

    #[test]
    fn test_structured_backend_error() {
        let err = ErrorResponse::into_error(
            422,
            r#"{"error":{"code":"invalid_config","message":"lm_name unknown"}}"#,
        );
        match err {
            Error::Backend {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(422));
                assert_eq!(code.as_deref(), Some("invalid_config"));
                assert_eq!(message, "lm_name unknown");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_detail_list_kept_verbatim() {
        let (_, message) = ErrorResponse::parse(r#"{"detail":[{"loc":["body","name"]}]}"#);
        assert!(message.contains("loc"));
    }

    #[test]
    fn test_plain_text_body() {
        let (code, message) = ErrorResponse::parse("Bad Gateway\n");
        assert!(code.is_none());
        assert_eq!(message, "Bad Gateway");
    }

    #[test]
    fn test_unwrap_envelope() {
        let data = unwrap_envelope(200, json!({"success": true, "data": {"id": "a1"}})).unwrap();
        assert_eq!(data, json!({"id": "a1"}));

        let bare = unwrap_envelope(200, json!({"id": "a1"})).unwrap();
        assert_eq!(bare["id"], "a1");

        let list = unwrap_envelope(200, json!([1, 2])).unwrap();
        assert_eq!(list, json!([1, 2]));

        let err = unwrap_envelope(
            200,
            json!({"success": false, "error": {"code": "quota", "message": "over quota"}}),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some("quota"));
    }
}
