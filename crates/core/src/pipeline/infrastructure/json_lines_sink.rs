use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::pipeline::frame_sink::{DetectionEvent, FrameSink, SinkError};
use crate::shared::frame::Frame;

/// Writes one JSON object per frame, newline-delimited.
///
/// Each line is flushed as it is written so a downstream reader tailing the
/// output sees events in real time.
pub struct JsonLinesSink<W: Write + Send> {
    name: String,
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Creates (or truncates) `path`, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let name = path.display().to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::io(name.clone(), e))?;
        }
        let file = File::create(path).map_err(|e| SinkError::io(name.clone(), e))?;
        Ok(Self::new(name, BufWriter::new(file)))
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new("stdout", io::stdout())
    }
}

impl<W: Write + Send> FrameSink for JsonLinesSink<W> {
    fn emit(&mut self, _annotated: &Frame, event: &DetectionEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event).map_err(|source| SinkError::Encode {
            sink: self.name.clone(),
            source,
        })?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(|e| SinkError::io(self.name.clone(), e))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .map_err(|e| SinkError::io(self.name.clone(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::detection::{BoundingBox, Detection};

    fn event(index: u64, detections: Vec<Detection>) -> (Frame, DetectionEvent) {
        let frame = Frame::black(640, 480, index);
        let event = DetectionEvent::new(&frame, detections);
        (frame, event)
    }

    fn face(x: u32, y: u32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, y, 50, 50),
            confidence: None,
            class_id: None,
        }
    }

    #[test]
    fn test_writes_one_line_per_frame() {
        let mut sink = JsonLinesSink::new("memory", Vec::new());
        let (frame, e0) = event(0, vec![face(10, 20)]);
        sink.emit(&frame, &e0).unwrap();
        let (frame, e1) = event(1, vec![]);
        sink.emit(&frame, &e1).unwrap();
        sink.close().unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["frame_index"], 0);
        assert_eq!(first["detections"][0]["x"], 10);
        assert_eq!(first["detections"][0]["y"], 20);
        assert!(first["detections"][0].get("confidence").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["frame_index"], 1);
        assert_eq!(second["detections"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_create_writes_to_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let mut sink = JsonLinesSink::create(&path).unwrap();
        let (frame, e) = event(7, vec![face(1, 2), face(3, 4)]);
        sink.emit(&frame, &e).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["frame_index"], 7);
        assert_eq!(value["detections"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_create_in_missing_root_fails() {
        let result = JsonLinesSink::create(Path::new("/nonexistent/dir/events.jsonl"));
        assert!(matches!(result, Err(SinkError::Io { .. })));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_names_sink() {
        let mut sink = JsonLinesSink::new("broken", BrokenWriter);
        let (frame, e) = event(0, vec![face(0, 0)]);
        let err = sink.emit(&frame, &e).unwrap_err();
        assert!(err.to_string().starts_with("broken"));
    }
}
