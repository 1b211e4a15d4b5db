/// Error type returned at the `Db` API boundary.
///
/// Lower crates (`cmap`, `metatable`, `bloom`) each carry their own
/// `thiserror` enum; this one wraps them for callers that only care about
/// the engine-level failure shape.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metatable error: {0}")]
    MetaTable(#[from] metatable::MetaError),
    #[error("container map error: {0}")]
    Cmap(#[from] cmap::CmapError),
    #[error("containermap configuration error: {0}")]
    CmapConfig(#[from] config::CmapConfigError),
    #[error("container map exhausted at level {level}")]
    ContainerMapExhausted { level: usize },
    #[error("retain failed to converge after {0} passes")]
    RetainStalled(u32),
    #[error("corrupt DB meta file: {0}")]
    CorruptMeta(String),
    #[error("engine is closing")]
    Closing,
}
