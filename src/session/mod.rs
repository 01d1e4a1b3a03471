pub mod controller;
pub mod state;

pub use controller::{Collaborators, SessionHandle, SessionMonitor};
pub use state::SessionSnapshot;
