pub mod frame_source;
pub mod source_error;
