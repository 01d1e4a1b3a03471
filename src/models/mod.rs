pub mod alert;
pub mod micro_break;
pub mod session;
pub mod telemetry;
pub mod tick;

pub use alert::{AlertReason, AttentionAlert};
pub use micro_break::{
    CloseReason, ClosedEpisode, MicroBreakContent, MicroBreakEpisode, TriggerReason,
};
pub use session::{ClientMeta, Session, SessionContext, SessionRequest, SessionStatus};
pub use telemetry::{EventBody, TelemetryEvent};
pub use tick::{Emotion, TickResult};
