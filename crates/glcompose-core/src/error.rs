use std::path::PathBuf;

/// Coarse classification of [`CompositorError`].
///
/// Callers branch on this instead of matching every variant: a `FatalInit` means the
/// compositor could not be built, a `Frame` error only costs the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FatalInit,
    OutOfMemory,
    Frame,
    InvalidArgument,
    Config,
}

/// Errors used across glcompose crates.
#[derive(thiserror::Error, Debug)]
pub enum CompositorError {
    // ---- Initialization (fatal) ----
    #[error("GL entry point `{0}` not found")]
    MissingEntryPoint(&'static str),

    #[error("unsupported GL context: {0}")]
    Unsupported(String),

    #[error("no texture converter accepts chroma {0}")]
    NoConverter(String),

    #[error("vertex shader compile error: {0}")]
    VertexCompile(String),

    #[error("fragment shader compile error: {0}")]
    FragmentCompile(String),

    #[error("program link error: {0}")]
    Link(String),

    #[error("unable to get {kind} location `{name}`")]
    MissingLocation { kind: &'static str, name: String },

    #[error("initialization failed: {0}")]
    FatalInit(String),

    // ---- Runtime ----
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("frame skipped: {0}")]
    Frame(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ---- Configuration ----
    #[error("invalid config at {path}: {msg}")]
    ConfigFile { path: PathBuf, msg: String },

    #[error("invalid config: {0}")]
    Config(String),
}

impl CompositorError {
    pub fn fatal<T: Into<String>>(s: T) -> Self {
        CompositorError::FatalInit(s.into())
    }

    pub fn frame<T: Into<String>>(s: T) -> Self {
        CompositorError::Frame(s.into())
    }

    pub fn oom<T: Into<String>>(s: T) -> Self {
        CompositorError::OutOfMemory(s.into())
    }

    pub fn kind(&self) -> ErrorKind {
        use CompositorError::*;
        match self {
            MissingEntryPoint(_) | Unsupported(_) | NoConverter(_) | VertexCompile(_)
            | FragmentCompile(_) | Link(_) | MissingLocation { .. } | FatalInit(_) => {
                ErrorKind::FatalInit
            }
            OutOfMemory(_) => ErrorKind::OutOfMemory,
            Frame(_) => ErrorKind::Frame,
            InvalidArgument(_) => ErrorKind::InvalidArgument,
            ConfigFile { .. } | Config(_) => ErrorKind::Config,
        }
    }

    /// True when the error only affects the frame being drawn.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Frame | ErrorKind::InvalidArgument)
    }
}
