pub mod coordinate_mapper;
pub mod detector;
pub mod detector_error;
