//! Live-chat monitoring daemon: engine, history, observer fan-out and the
//! local control surface.

pub mod autostop;
pub mod config;
pub mod engine;
pub mod fanout;
pub mod history;
pub mod poll;
pub mod retry;
pub mod server;

pub use engine::{run_engine, Engine, EngineConfig, EngineHandle, EngineMessage};
pub use fanout::{DirectSubscription, FanOut};
