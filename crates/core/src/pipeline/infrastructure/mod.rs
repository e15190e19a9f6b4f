pub mod fan_out_sink;
pub mod image_directory_sink;
pub mod json_lines_sink;
#[cfg(feature = "mqtt")]
pub mod mqtt_sink;
