pub mod attention;
pub mod camera;
pub mod controller;
pub mod loop_worker;

pub use attention::{attention_score, normalize};
pub use camera::{encode_frame, shared, Camera, DirectoryCamera, SharedCamera};
pub use controller::{CaptureController, CaptureDisplay};
