pub mod png;
pub mod tool;
pub mod video;

// Re-export commonly used types
pub use png::{export_frames, frame_to_png, Converter};
pub use tool::{check_tool, SystemRunner, Tools};
pub use video::{assemble_video, images_to_video, AssemblyOutcome};
