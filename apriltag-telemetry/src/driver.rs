use tracing::{error, info, warn};

use crate::{
    detector::TagDetector,
    pipeline::FramePipeline,
    source::{SourceDescriptor, SourceOpener},
    stop::StopSignal,
    telemetry::TelemetryPublisher,
};

/// Totals from [MultiSourceDriver::run].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: usize,
    /// Sources that were opened and ran until their end, a read error, or
    /// cancellation.
    pub sources_completed: usize,
    /// Sources that could not be opened.
    pub sources_failed: usize,
    pub shutdown_requested: bool,
}

/// Runs the pipeline over each configured source in turn.
pub struct MultiSourceDriver<O> {
    opener: O,
    sources: Vec<SourceDescriptor>,
    max_num_frames: Option<usize>,
}

impl<O: SourceOpener> MultiSourceDriver<O> {
    pub fn new(opener: O, sources: Vec<SourceDescriptor>) -> Self {
        Self {
            opener,
            sources,
            max_num_frames: None,
        }
    }

    /// Stop after `max_num_frames` frames in total.
    pub fn with_max_num_frames(mut self, max_num_frames: Option<usize>) -> Self {
        self.max_num_frames = max_num_frames;
        self
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Process all sources sequentially.
    ///
    /// A source which fails to open is logged and skipped.
    pub fn run<D, P>(&mut self, pipeline: &mut FramePipeline<D, P>, stop: &StopSignal) -> RunSummary
    where
        D: TagDetector,
        P: TelemetryPublisher,
    {
        let mut summary = RunSummary::default();

        for (source_index, descriptor) in self.sources.iter().enumerate() {
            if stop.shutdown_requested() || self.frame_limit_reached(&summary) {
                summary.shutdown_requested = stop.shutdown_requested();
                break;
            }

            let mut source = match self.opener.open(source_index, descriptor) {
                Ok(source) => source,
                Err(e) => {
                    error!("source {source_index} ({descriptor}) unavailable: {e}");
                    summary.sources_failed += 1;
                    continue;
                }
            };
            info!("processing source {source_index}: {descriptor}");

            loop {
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!("source {source_index} ({descriptor}) ended");
                        break;
                    }
                    Err(e) => {
                        warn!("source {source_index} ({descriptor}) ended: {e}");
                        break;
                    }
                };

                pipeline.process_frame(&frame);
                summary.frames_processed += 1;

                if stop.shutdown_requested() {
                    info!("shutdown requested");
                    summary.shutdown_requested = true;
                    break;
                }
                if stop.take_skip_source() {
                    info!("stopping source {source_index} ({descriptor}) on request");
                    break;
                }
                if self.frame_limit_reached(&summary) {
                    info!("maximum number of frames processed");
                    break;
                }
            }
            summary.sources_completed += 1;
        }

        summary
    }

    fn frame_limit_reached(&self, summary: &RunSummary) -> bool {
        self.max_num_frames
            .map(|max| summary.frames_processed >= max)
            .unwrap_or(false)
    }
}
