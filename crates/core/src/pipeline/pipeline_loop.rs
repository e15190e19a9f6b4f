use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::capture::domain::frame_source::{FrameRead, FrameSource};
use crate::detection::domain::coordinate_mapper::CoordinateMapper;
use crate::detection::domain::detector::Detector;
use crate::pipeline::frame_sink::{DetectionEvent, FrameSink};
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_state::{PipelineState, TerminationReason};

/// Outcome of [`PipelineLoop::run`].
#[derive(Debug)]
pub struct PipelineReport {
    pub reason: TerminationReason,
    pub frames_processed: u64,
    pub detections_emitted: u64,
    pub geometry_warnings: u64,
}

/// Sequential capture loop: read → detect → map → annotate → emit.
///
/// Owns every collaborator for the length of the run. One frame is fully
/// processed before the next is read. The termination flag is checked once
/// per iteration, after the frame has been emitted; a detector call is never
/// interrupted. Any source, detector or sink error ends the run.
pub struct PipelineLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    mapper: CoordinateMapper,
    annotator: Box<dyn FrameAnnotator>,
    sink: Box<dyn FrameSink>,
    terminate: Arc<AtomicBool>,
    logger: Box<dyn PipelineLogger>,
    max_frames: Option<u64>,
    state: PipelineState,
    frames_processed: u64,
    detections_emitted: u64,
    geometry_warnings: u64,
}

impl PipelineLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        mapper: CoordinateMapper,
        annotator: Box<dyn FrameAnnotator>,
        sink: Box<dyn FrameSink>,
        terminate: Arc<AtomicBool>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            source,
            detector,
            mapper,
            annotator,
            sink,
            terminate,
            logger,
            max_frames: None,
            state: PipelineState::Running,
            frames_processed: 0,
            detections_emitted: 0,
            geometry_warnings: 0,
        }
    }

    /// Stops with [`TerminationReason::UserRequestedExit`] after `limit` frames.
    pub fn with_max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames = limit;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Performs one iteration. Once terminated, further calls do nothing.
    pub fn step(&mut self) -> &PipelineState {
        if self.state.is_running() {
            let outcome = match self.iterate() {
                Ok(outcome) => outcome,
                Err(e) => Some(TerminationReason::UnrecoverableError(e)),
            };
            if let Some(reason) = outcome {
                self.terminate_with(reason);
            }
        }
        &self.state
    }

    /// Steps until terminated, then reports why and how much was done.
    pub fn run(mut self) -> PipelineReport {
        self.logger.info(&format!(
            "Pipeline started: {} -> {} detector",
            self.source.describe(),
            self.detector.name()
        ));
        while self.step().is_running() {}
        self.logger.summary();

        let PipelineState::Terminated(reason) = self.state else {
            unreachable!("step loop exits only once terminated");
        };
        PipelineReport {
            reason,
            frames_processed: self.frames_processed,
            detections_emitted: self.detections_emitted,
            geometry_warnings: self.geometry_warnings,
        }
    }

    fn iterate(&mut self) -> Result<Option<TerminationReason>, PipelineError> {
        let t0 = Instant::now();
        let frame = match self.source.read_frame()? {
            FrameRead::Frame(frame) => frame,
            FrameRead::EndOfStream => return Ok(Some(TerminationReason::SourceExhausted)),
        };
        self.logger.timing("read", elapsed_ms(t0));

        let t0 = Instant::now();
        let raw = self.detector.detect(&frame)?;
        self.logger.timing("detect", elapsed_ms(t0));

        let t0 = Instant::now();
        let mapped = self
            .mapper
            .map(&raw, self.detector.reference_space(), frame.size());
        for warning in &mapped.warnings {
            log::warn!("Frame {}: {warning}", frame.index());
        }
        self.logger.timing("map", elapsed_ms(t0));

        let t0 = Instant::now();
        let annotated = self.annotator.annotate(&frame, &mapped.detections);
        self.logger.timing("annotate", elapsed_ms(t0));

        let t0 = Instant::now();
        let event = DetectionEvent::new(&frame, mapped.detections);
        self.sink.emit(&annotated, &event)?;
        self.logger.timing("emit", elapsed_ms(t0));

        log::debug!(
            "Frame {}: {} detections",
            frame.index(),
            event.detections.len()
        );
        self.frames_processed += 1;
        self.detections_emitted += event.detections.len() as u64;
        self.geometry_warnings += mapped.warnings.len() as u64;
        self.logger.metric("detections", event.detections.len() as f64);
        self.logger.metric("geometry_warnings", mapped.warnings.len() as f64);
        self.logger.progress(self.frames_processed, self.max_frames);

        if self.terminate.load(Ordering::Relaxed) {
            return Ok(Some(TerminationReason::UserRequestedExit));
        }
        if self.max_frames.is_some_and(|limit| self.frames_processed >= limit) {
            return Ok(Some(TerminationReason::UserRequestedExit));
        }
        Ok(None)
    }

    fn terminate_with(&mut self, reason: TerminationReason) {
        let reason = match self.sink.close() {
            Ok(()) => reason,
            Err(e) if reason.is_clean() => TerminationReason::UnrecoverableError(e.into()),
            Err(e) => {
                log::warn!("Closing the sink after a failure also failed: {e}");
                reason
            }
        };
        self.logger.info(&format!(
            "Pipeline terminated after {} frames: {reason}",
            self.frames_processed
        ));
        self.state = PipelineState::Terminated(reason);
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::infrastructure::box_annotator::BoxAnnotator;
    use crate::capture::domain::source_error::SourceError;
    use crate::detection::domain::detector::ReferenceSpace;
    use crate::detection::domain::detector_error::InferenceError;
    use crate::pipeline::frame_sink::SinkError;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::detection::{RawBox, RawDetection};
    use crate::shared::frame::{Frame, Size};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    // --- Stubs ---

    struct StubSource {
        reads: VecDeque<Result<FrameRead, SourceError>>,
        endless: bool,
        next_index: u64,
        read_calls: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn frames(count: u64) -> Self {
            Self {
                reads: (0..count)
                    .map(|i| Ok(FrameRead::Frame(Frame::black(640, 480, i))))
                    .collect(),
                endless: false,
                next_index: count,
                read_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn endless() -> Self {
            Self {
                endless: true,
                ..Self::frames(0)
            }
        }

        fn failing() -> Self {
            let mut source = Self::frames(0);
            source
                .reads
                .push_back(Err(SourceError::read("camera 1", "device unplugged")));
            source
        }
    }

    impl FrameSource for StubSource {
        fn describe(&self) -> String {
            "stub source".into()
        }

        fn read_frame(&mut self) -> Result<FrameRead, SourceError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(read) = self.reads.pop_front() {
                return read;
            }
            if self.endless {
                self.next_index += 1;
                return Ok(FrameRead::Frame(Frame::black(64, 48, self.next_index)));
            }
            Ok(FrameRead::EndOfStream)
        }
    }

    struct StubDetector {
        output: Vec<RawDetection>,
        space: ReferenceSpace,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StubDetector {
        fn returning(output: Vec<RawDetection>, space: ReferenceSpace) -> Self {
            Self {
                output,
                space,
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn empty() -> Self {
            Self::returning(Vec::new(), ReferenceSpace::Frame)
        }
    }

    impl Detector for StubDetector {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn reference_space(&self) -> ReferenceSpace {
            self.space
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InferenceError::new("stub", "accelerator fault"));
            }
            Ok(self.output.clone())
        }
    }

    #[derive(Default)]
    struct Recorded {
        frames: Vec<Frame>,
        events: Vec<DetectionEvent>,
        closed: usize,
    }

    struct RecordingSink {
        recorded: Arc<Mutex<Recorded>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Recorded>>) {
            let recorded = Arc::new(Mutex::new(Recorded::default()));
            (
                Self {
                    recorded: recorded.clone(),
                    fail: false,
                },
                recorded,
            )
        }
    }

    impl FrameSink for RecordingSink {
        fn emit(&mut self, annotated: &Frame, event: &DetectionEvent) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::other("recording sink", "disk full"));
            }
            let mut recorded = self.recorded.lock().unwrap();
            recorded.frames.push(annotated.clone());
            recorded.events.push(event.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            self.recorded.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    fn pipeline(
        source: StubSource,
        detector: StubDetector,
        sink: RecordingSink,
        terminate: Arc<AtomicBool>,
    ) -> PipelineLoop {
        PipelineLoop::new(
            Box::new(source),
            Box::new(detector),
            CoordinateMapper::new(),
            Box::new(BoxAnnotator::default()),
            Box::new(sink),
            terminate,
            Box::new(NullPipelineLogger),
        )
    }

    fn pixel_box(x: f64, y: f64, w: f64, h: f64, confidence: f32) -> RawDetection {
        RawDetection {
            bbox: RawBox::from_xywh(x, y, w, h),
            confidence: Some(confidence),
            class_id: None,
        }
    }

    // --- Tests ---

    #[test]
    fn test_end_to_end_single_black_frame() {
        let (sink, recorded) = RecordingSink::new();
        let detector = StubDetector::returning(
            vec![pixel_box(100.0, 100.0, 50.0, 50.0, 0.9)],
            ReferenceSpace::Frame,
        );
        let report = pipeline(StubSource::frames(1), detector, sink, Arc::default()).run();

        assert!(matches!(report.reason, TerminationReason::SourceExhausted));
        assert_eq!(report.frames_processed, 1);
        assert_eq!(report.detections_emitted, 1);

        let recorded = recorded.lock().unwrap();
        let event = &recorded.events[0];
        assert_eq!(event.detections.len(), 1);
        assert_eq!(event.detections[0].confidence, Some(0.9));

        let annotated = &recorded.frames[0];
        let green = Some(&[0u8, 255, 0][..]);
        let black = Some(&[0u8, 0, 0][..]);
        for (x, y) in [(100, 100), (149, 100), (100, 149), (149, 149), (120, 100), (149, 130)] {
            assert_eq!(annotated.pixel(x, y), green, "border pixel ({x}, {y})");
        }
        for (x, y) in [(101, 101), (125, 125), (99, 99), (150, 150)] {
            assert_eq!(annotated.pixel(x, y), black, "pixel ({x}, {y})");
        }
        assert_eq!(recorded.closed, 1);
    }

    #[test]
    fn test_end_of_stream_stops_without_further_detection() {
        let source = StubSource::frames(3);
        let reads = source.read_calls.clone();
        let detector = StubDetector::empty();
        let detects = detector.calls.clone();
        let (sink, recorded) = RecordingSink::new();
        let mut pipeline = pipeline(source, detector, sink, Arc::default());

        while pipeline.step().is_running() {}
        assert!(matches!(
            pipeline.state(),
            PipelineState::Terminated(TerminationReason::SourceExhausted)
        ));
        assert_eq!(reads.load(Ordering::SeqCst), 4);
        assert_eq!(detects.load(Ordering::SeqCst), 3);

        pipeline.step();
        pipeline.step();
        assert_eq!(reads.load(Ordering::SeqCst), 4);
        assert_eq!(detects.load(Ordering::SeqCst), 3);
        assert_eq!(recorded.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_frames_are_emitted_in_capture_order() {
        let (sink, recorded) = RecordingSink::new();
        let report = pipeline(
            StubSource::frames(5),
            StubDetector::empty(),
            sink,
            Arc::default(),
        )
        .run();
        assert_eq!(report.frames_processed, 5);

        let indices: Vec<u64> = recorded
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|e| e.frame_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_read_failure_is_fatal_before_detection() {
        let detector = StubDetector::empty();
        let detects = detector.calls.clone();
        let (sink, recorded) = RecordingSink::new();
        let report = pipeline(StubSource::failing(), detector, sink, Arc::default()).run();

        match &report.reason {
            TerminationReason::UnrecoverableError(PipelineError::Source(e)) => {
                assert!(e.to_string().contains("camera 1"));
            }
            other => panic!("unexpected termination: {other:?}"),
        }
        assert!(!report.reason.is_clean());
        assert_eq!(detects.load(Ordering::SeqCst), 0);
        assert_eq!(recorded.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_inference_failure_names_backend() {
        let mut detector = StubDetector::empty();
        detector.fail = true;
        let (sink, recorded) = RecordingSink::new();
        let report = pipeline(StubSource::frames(3), detector, sink, Arc::default()).run();

        assert!(matches!(
            report.reason,
            TerminationReason::UnrecoverableError(PipelineError::Inference(_))
        ));
        assert!(report.reason.to_string().contains("stub detector failed"));
        assert_eq!(report.frames_processed, 0);
        assert!(recorded.lock().unwrap().events.is_empty());
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let (mut sink, _) = RecordingSink::new();
        sink.fail = true;
        let report = pipeline(
            StubSource::frames(3),
            StubDetector::empty(),
            sink,
            Arc::default(),
        )
        .run();
        assert!(matches!(
            report.reason,
            TerminationReason::UnrecoverableError(PipelineError::Sink(_))
        ));
    }

    #[test]
    fn test_termination_signal_is_checked_after_emit() {
        let terminate = Arc::new(AtomicBool::new(true));
        let (sink, recorded) = RecordingSink::new();
        let report = pipeline(StubSource::endless(), StubDetector::empty(), sink, terminate).run();

        assert!(matches!(report.reason, TerminationReason::UserRequestedExit));
        assert_eq!(report.frames_processed, 1);
        assert_eq!(recorded.lock().unwrap().events.len(), 1);
    }

    #[test]
    fn test_max_frames_limits_endless_source() {
        let (sink, _) = RecordingSink::new();
        let report = pipeline(StubSource::endless(), StubDetector::empty(), sink, Arc::default())
            .with_max_frames(Some(4))
            .run();
        assert!(matches!(report.reason, TerminationReason::UserRequestedExit));
        assert!(report.reason.is_clean());
        assert_eq!(report.frames_processed, 4);
    }

    #[test]
    fn test_normalized_detections_are_mapped_to_frame_pixels() {
        let detector = StubDetector::returning(
            vec![RawDetection {
                bbox: RawBox::from_yxyx([0.1, 0.2, 0.5, 0.6]),
                confidence: Some(0.8),
                class_id: Some(1),
            }],
            ReferenceSpace::Normalized {
                input: Size::new(300, 300),
            },
        );
        let (sink, recorded) = RecordingSink::new();
        pipeline(StubSource::frames(1), detector, sink, Arc::default()).run();

        let recorded = recorded.lock().unwrap();
        let b = recorded.events[0].detections[0].bbox;
        assert_eq!((b.x, b.y, b.right(), b.bottom()), (128, 48, 384, 240));
    }

    #[test]
    fn test_out_of_frame_detections_are_clamped_not_fatal() {
        let detector = StubDetector::returning(
            vec![
                pixel_box(600.0, 400.0, 100.0, 100.0, 0.7),
                pixel_box(900.0, 900.0, 10.0, 10.0, 0.7),
            ],
            ReferenceSpace::Frame,
        );
        let (sink, recorded) = RecordingSink::new();
        let report = pipeline(StubSource::frames(2), detector, sink, Arc::default()).run();

        assert!(matches!(report.reason, TerminationReason::SourceExhausted));
        assert_eq!(report.geometry_warnings, 4);
        assert_eq!(report.detections_emitted, 2);
        for event in &recorded.lock().unwrap().events {
            for d in &event.detections {
                assert!(d.bbox.right() <= event.frame_width);
                assert!(d.bbox.bottom() <= event.frame_height);
            }
        }
    }
}
