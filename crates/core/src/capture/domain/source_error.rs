use thiserror::Error;

/// Failure to open or read from a frame source.
///
/// Always fatal for the pipeline: there is no retry at this level.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {device}: {message}")]
    Open { device: String, message: String },
    #[error("error reading a frame from {device}: {message}")]
    Read { device: String, message: String },
}

impl SourceError {
    pub fn open(device: impl Into<String>, message: impl ToString) -> Self {
        Self::Open {
            device: device.into(),
            message: message.to_string(),
        }
    }

    pub fn read(device: impl Into<String>, message: impl ToString) -> Self {
        Self::Read {
            device: device.into(),
            message: message.to_string(),
        }
    }
}
