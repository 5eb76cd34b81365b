use std::future::Future;

/// Outcome of running candidate code against one input.
#[derive(Clone, Debug)]
pub enum Execution {
    Completed {
        stdout: String,
    },
    /// The candidate program failed to compile or run. A normal outcome,
    /// reported back to the submitter rather than treated as a system fault.
    RuntimeError {
        error: String,
    },
}

#[derive(thiserror::Error, Debug)]
#[error("code execution service failed: {message}")]
pub struct ExecutorError {
    pub message: String,
}

/// Sandboxed code-execution service, invoked once per test case.
pub trait CodeExecutor {
    fn execute(
        &self,
        source_code: &str,
        language: &str,
        input: &str,
    ) -> impl Future<Output = Result<Execution, ExecutorError>> + Send;
}
