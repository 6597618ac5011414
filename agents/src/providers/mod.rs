//! Prediction providers, one per fallback tier

pub mod local;
pub mod remote;
pub mod synthetic;

pub use local::{FoldOutput, FoldingModel, LocalModelProvider, LOCAL_METHOD};
pub use remote::{RemoteAtlasProvider, REMOTE_METHOD};
pub use synthetic::{SyntheticProvider, SYNTHETIC_METHOD};
