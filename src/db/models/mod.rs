pub mod stored_event;

pub use stored_event::StoredEvent;
