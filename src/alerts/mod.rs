mod dispatcher;
mod policy;

pub use dispatcher::AlertDispatcher;
pub use policy::AlertFlags;
