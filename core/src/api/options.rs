//! Configuration options for the compiler engine.

use crate::String;

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use trigc_core::api::CompilationOptions;
///
/// let options = CompilationOptions {
///     warn_on_unused_variables: false,
///     ..CompilationOptions::default()
/// };
/// assert!(options.auto_request_serialization);
/// ```
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    /// Append `RequestSerialization` to methods that write a synced variable.
    ///
    /// Default: true
    pub auto_request_serialization: bool,

    /// Namespace stem for merged action groups. The merge counter and an
    /// underscore are appended (`__grp0_`, `__grp1_`...).
    ///
    /// Default: `"__grp"`
    pub group_prefix: String,

    /// Warn about trigger variables no action reads or writes.
    ///
    /// Default: true
    pub warn_on_unused_variables: bool,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            auto_request_serialization: true,
            group_prefix: String::from("__grp"),
            warn_on_unused_variables: true,
        }
    }
}

/// Configuration options for the engine.
///
/// These set the defaults used by [`Engine::compile`](super::Engine::compile);
/// [`Engine::compile_with`](super::Engine::compile_with) overrides them per
/// call.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Default options for compilation.
    pub compilation: CompilationOptions,
}
