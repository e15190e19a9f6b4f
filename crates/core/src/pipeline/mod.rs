pub mod frame_sink;
pub mod infrastructure;
pub mod pipeline_error;
pub mod pipeline_logger;
pub mod pipeline_loop;
pub mod pipeline_state;
