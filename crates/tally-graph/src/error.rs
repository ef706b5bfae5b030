//! Graph errors

/// Errors raised while building or walking the configured graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The configured target was never added to the graph
    #[error("configured target not in graph: {0}")]
    UnknownTarget(String),

    #[error("configured target depends on itself: {0}")]
    SelfDependency(String),

    /// A dependency cycle; the graph is expected to be acyclic by construction
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
}
