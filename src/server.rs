//! HTTP request dispatcher
//!
//! Decodes execution requests, applies per-client admission control,
//! invokes the sandbox executor, and encodes classified responses. Status
//! codes separate "your code failed" (200 with error fields) from "the
//! sandbox failed to run your code" (5xx).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::error::Error;
use crate::language::Language;
use crate::limiter::RateLimiter;
use crate::sandbox::{CodeExecutor, ExecutionRequest};

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn CodeExecutor>,
    pub limiter: Arc<RateLimiter>,
}

/// Wire form of an execution request
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Language identifier, e.g. "python"
    pub language: String,
    /// Source code to run
    pub code: String,
    /// Wall-clock deadline, e.g. "5s"
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Wire form of an execution response
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Captured standard output
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// User-visible failure, if the code did not exit zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Exit code, when the process reached one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    /// Whether the run was cut short by the deadline
    #[serde(default)]
    pub timed_out: bool,
    /// Wall-clock execution time in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

// ---- Error Handling ----

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Validation(_) | Error::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

// ---- Handlers ----

async fn handle_execute(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError> {
    // Admission first: rejected callers must not cost a sandbox
    let key = addr.ip().to_string();
    if !state.limiter.allow(&key) {
        return Err(AppError(Error::RateLimited(format!("client {}", key))));
    }

    let language: Language = req.language.parse()?;
    debug!(%language, timeout = ?req.timeout, client = %key, "dispatching execution");

    let request = ExecutionRequest::new(language, req.code).with_timeout(req.timeout);
    let result = state.executor.execute(request).await?;

    Ok(Json(ExecuteResponse {
        error: result.error(),
        exit_code: result.exit_code,
        timed_out: result.timed_out,
        duration_ms: result.execution_time.as_millis() as u64,
        output: result.stdout,
    }))
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let backend = match state.executor.ping().await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };
    Json(serde_json::json!({
        "status": "ok",
        "executor": state.executor.name(),
        "backend": backend,
        "version": crate::VERSION,
    }))
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/execute", post(handle_execute))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::sandbox::ExecutionResult;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    enum StubOutcome {
        Result(ExecutionResult),
        Fault,
    }

    struct StubExecutor {
        outcome: StubOutcome,
        calls: AtomicUsize,
    }

    impl StubExecutor {
        fn returning(result: ExecutionResult) -> Arc<Self> {
            Arc::new(StubExecutor {
                outcome: StubOutcome::Result(result),
                calls: AtomicUsize::new(0),
            })
        }

        fn faulting() -> Arc<Self> {
            Arc::new(StubExecutor {
                outcome: StubOutcome::Fault,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CodeExecutor for StubExecutor {
        fn name(&self) -> &str {
            "stub"
        }

        async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Same contract as the real executor: validate before any work
            request.validate()?;
            match &self.outcome {
                StubOutcome::Result(result) => Ok(result.clone()),
                StubOutcome::Fault => Err(Error::Container("stub fault".into())),
            }
        }
    }

    fn router(executor: Arc<StubExecutor>, rate: usize) -> Router {
        build_router(AppState {
            executor,
            limiter: Arc::new(RateLimiter::new(rate, Duration::from_secs(60))),
        })
    }

    fn execute_request(body: serde_json::Value) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        request
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ok_result() -> ExecutionResult {
        ExecutionResult::completed(
            0,
            "hello\n".to_string(),
            String::new(),
            Duration::from_millis(42),
            "abc123".to_string(),
        )
    }

    #[tokio::test]
    async fn successful_run_returns_output() {
        let app = router(StubExecutor::returning(ok_result()), 10);
        let body = serde_json::json!({"language": "python", "code": "print('hello')", "timeout": "5s"});

        let response = app.oneshot(execute_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["output"], "hello\n");
        assert!(json.get("error").is_none());
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["timed_out"], false);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_without_execution() {
        let executor = StubExecutor::returning(ok_result());
        let app = router(executor.clone(), 10);
        let body = serde_json::json!({"language": "cobol", "code": "DISPLAY 'HI'"});

        let response = app.oneshot(execute_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("cobol"));
    }

    #[tokio::test]
    async fn out_of_range_timeout_is_a_bad_request() {
        let app = router(StubExecutor::returning(ok_result()), 10);
        let body = serde_json::json!({"language": "python", "code": "", "timeout": "45s"});

        let response = app.oneshot(execute_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn over_rate_requests_get_429() {
        let executor = StubExecutor::returning(ok_result());
        let app = router(executor.clone(), 1);
        let body = serde_json::json!({"language": "python", "code": "print(1)"});

        let first = app
            .clone()
            .oneshot(execute_request(body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(execute_request(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_run_reports_timeout_in_body() {
        let result = ExecutionResult::timeout(
            "partial".to_string(),
            String::new(),
            Duration::from_secs(5),
            "abc123".to_string(),
        );
        let app = router(StubExecutor::returning(result), 10);
        let body = serde_json::json!({"language": "python", "code": "while True: pass"});

        let response = app.oneshot(execute_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["timed_out"], true);
        assert_eq!(json["output"], "partial");
        assert!(json["error"].as_str().unwrap().contains("timed out"));
        assert!(json.get("exit_code").is_none());
    }

    #[tokio::test]
    async fn sandbox_fault_is_a_server_error() {
        let app = router(StubExecutor::faulting(), 10);
        let body = serde_json::json!({"language": "python", "code": "print(1)"});

        let response = app.oneshot(execute_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let app = router(StubExecutor::returning(ok_result()), 10);
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["executor"], "stub");
    }
}
