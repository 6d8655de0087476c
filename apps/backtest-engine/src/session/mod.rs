//! Trading session: the secondary event queue and the dispatch loop.

mod error;
mod queue;
mod trading;

pub use error::{DispatchStage, SessionAbort, SessionError};
pub use queue::EventQueue;
pub use trading::{
    SessionCounters, SessionReport, SessionSettings, SessionState, Termination, TradingSession,
    TradingSessionBuilder,
};
