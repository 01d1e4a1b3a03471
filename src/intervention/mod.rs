pub mod content;
pub mod engine;
pub mod state;

pub use content::{select_content, ContentLibrary, HttpContentLibrary, StaticLibrary};
pub use engine::{InterventionEngine, TickOutcome};
pub use state::{is_bad_tick, InterventionPhase, StreakState};
