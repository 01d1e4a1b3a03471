mod flush;
mod queue;

pub use flush::{FlushEngine, FlushHandle, FlushOutcome};
pub use queue::EventQueue;
