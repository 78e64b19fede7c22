pub mod control;
pub mod dedup;
pub mod error;
pub mod event;
pub mod limits;
pub mod message;

pub use control::{ControlError, ControlRequest, ControlResponse, MonitoringState, PollState, SurfaceSignal};
pub use dedup::Deduplicator;
pub use error::{analyze_error, ErrorInfo, ErrorKind, Severity};
pub use event::{ObserverEvent, ObserverHandle};
pub use message::{classify, include, Author, ChatMessage, Comment, FilterConfig, Role};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
