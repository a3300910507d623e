use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::metrics::{CODE_EXECUTIONS_TOTAL, CODE_EXECUTION_DURATION_SECONDS};

/// Runtime version and source file extension for each language the
/// execution service accepts.
const RUNTIMES: &[(&str, &str, &str)] = &[
    ("python", "3.10.0", "py"),
    ("javascript", "18.15.0", "js"),
    ("typescript", "1.32.3", "ts"),
    ("java", "15.0.2", "java"),
    ("c", "10.2.0", "c"),
    ("cpp", "10.2.0", "cpp"),
    ("ruby", "3.0.1", "rb"),
    ("go", "1.16.2", "go"),
    ("php", "8.2.3", "php"),
    ("rust", "1.68.2", "rs"),
    ("bash", "5.2.0", "sh"),
];

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("execution service unreachable: {0}")]
    Transport(String),

    #[error("execution service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed execution response: {0}")]
    MalformedResponse(String),
}

impl ExecutionError {
    /// Caller-facing reason; never includes the upstream response body.
    pub fn public_reason(&self) -> String {
        match self {
            ExecutionError::UnsupportedLanguage(lang) => format!("Unsupported language: {}", lang),
            ExecutionError::Transport(_) => "Execution service unavailable".to_string(),
            ExecutionError::Rejected { status, .. } => {
                format!("Execution service rejected the run ({})", status)
            }
            ExecutionError::Timeout(limit) => {
                format!("Execution timed out after {}s", limit.as_secs())
            }
            ExecutionError::MalformedResponse(_) => {
                "Execution service returned an unreadable response".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Remote code runner. Implementations must bound every call in time.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str, language: &str) -> Result<ExecutionOutput, ExecutionError>;
}

/// Resolves a language name (case-insensitive) to its runtime version and
/// file extension.
pub fn runtime_for(language: &str) -> Result<(String, &'static str, &'static str), ExecutionError> {
    let lang = language.trim().to_lowercase();
    RUNTIMES
        .iter()
        .find(|(name, _, _)| *name == lang)
        .map(|(_, version, ext)| (lang.clone(), *version, *ext))
        .ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))
}

#[derive(Debug, Deserialize)]
struct PistonResponse {
    run: Option<ExecutionOutput>,
}

/// Client for a Piston-compatible `/execute` endpoint.
#[derive(Clone)]
pub struct PistonExecutor {
    client: Client,
    url: String,
    timeout: Duration,
}

impl PistonExecutor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
        }
    }

    async fn run(
        &self,
        code: &str,
        language: &str,
        version: &str,
        extension: &str,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let body = serde_json::json!({
            "language": language,
            "version": version,
            "files": [{ "name": format!("Main.{}", extension), "content": code }],
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PistonResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::MalformedResponse(e.to_string()))?;

        Ok(parsed.run.unwrap_or_default())
    }
}

#[async_trait]
impl CodeExecutor for PistonExecutor {
    async fn execute(&self, code: &str, language: &str) -> Result<ExecutionOutput, ExecutionError> {
        let (lang, version, extension) = runtime_for(language)?;

        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            self.run(code, &lang, version, extension),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.timeout)),
        };

        let status = if result.is_ok() { "success" } else { "error" };
        CODE_EXECUTIONS_TOTAL
            .with_label_values(&[lang.as_str(), status])
            .inc();
        CODE_EXECUTION_DURATION_SECONDS
            .with_label_values(&[lang.as_str()])
            .observe(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::warn!("Code execution failed for language {}: {}", lang, e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_lookup_is_case_insensitive() {
        let (lang, version, ext) = runtime_for("Python").unwrap();
        assert_eq!(lang, "python");
        assert_eq!(version, "3.10.0");
        assert_eq!(ext, "py");

        let (_, version, ext) = runtime_for("cpp").unwrap();
        assert_eq!(version, "10.2.0");
        assert_eq!(ext, "cpp");
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = runtime_for("cobol").unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedLanguage(ref l) if l == "cobol"));
        assert_eq!(err.public_reason(), "Unsupported language: cobol");
    }

    #[test]
    fn public_reason_hides_upstream_body() {
        let err = ExecutionError::Rejected {
            status: 502,
            body: "internal stack trace".to_string(),
        };
        assert!(!err.public_reason().contains("stack trace"));
        assert!(err.public_reason().contains("502"));
    }

    #[test]
    fn run_block_fields_default_to_empty() {
        let parsed: PistonResponse =
            serde_json::from_str(r#"{"run": {"output": "2\n"}}"#).unwrap();
        let run = parsed.run.unwrap();
        assert_eq!(run.output, "2\n");
        assert_eq!(run.stdout, "");
        assert_eq!(run.stderr, "");

        let empty: PistonResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.run.is_none());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let executor = PistonExecutor::new("http://127.0.0.1:9/execute", Duration::from_secs(2));
        let err = executor.execute("print(1)", "python").await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Transport(_) | ExecutionError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn unsupported_language_never_calls_out() {
        let executor = PistonExecutor::new("http://127.0.0.1:9/execute", Duration::from_millis(1));
        let err = executor.execute("x", "brainfuck").await.unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedLanguage(_)));
    }
}
