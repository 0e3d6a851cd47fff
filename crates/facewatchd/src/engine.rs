use crate::annotate::{self, Preview};
use crate::throttle::SaveThrottle;
use facewatch_core::normalize::{crop_face, normalize_crop, template_from_stored};
use facewatch_core::registry::RegistryError;
use facewatch_core::{
    Config, DetectorParams, FaceLocalizer, FaceRect, FaceRegistry, FaceTemplate, MatchPolicy,
};
use facewatch_hw::{CaptureError, FrameSource};
use facewatch_store::FaceStore;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{backend} image store is unreachable")]
    BackendUnreachable { backend: &'static str },
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// What happened to one detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceOutcome {
    /// Crop had no area after clamping to the frame.
    Degenerate,
    /// A face was accepted too recently.
    Throttled,
    /// Matched a known face.
    Duplicate { best: f32 },
    /// Stored and added to the registry.
    Accepted { id: String },
    /// The backend did not confirm the write; the registry is unchanged.
    StoreFailed,
}

/// Per-frame result, one outcome per detected rectangle, in detection order.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub faces: Vec<(FaceRect, FaceOutcome)>,
}

impl FrameReport {
    pub fn accepted(&self) -> usize {
        self.faces
            .iter()
            .filter(|(_, o)| matches!(o, FaceOutcome::Accepted { .. }))
            .count()
    }
}

/// Why the capture loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    EndOfStream,
    CaptureFailed,
}

/// Counters for one run of the capture loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub faces: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub throttled: u64,
    pub degenerate: u64,
    pub store_failures: u64,
}

impl RunSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        for (_, outcome) in &report.faces {
            self.faces += 1;
            match outcome {
                FaceOutcome::Degenerate => self.degenerate += 1,
                FaceOutcome::Throttled => self.throttled += 1,
                FaceOutcome::Duplicate { .. } => self.duplicates += 1,
                FaceOutcome::Accepted { .. } => self.accepted += 1,
                FaceOutcome::StoreFailed => self.store_failures += 1,
            }
        }
    }
}

/// Capture → detect → deduplicate → persist.
///
/// Owns the frame source, the localizer, the persistence backend and the
/// registry. Runs on a single thread; a face is added to the registry only
/// after the backend confirms the write.
pub struct Pipeline {
    source: Box<dyn FrameSource>,
    localizer: Box<dyn FaceLocalizer>,
    store: Box<dyn FaceStore>,
    registry: FaceRegistry,
    throttle: SaveThrottle,
    detector: DetectorParams,
    preview: Option<Preview>,
    summary: RunSummary,
}

impl Pipeline {
    /// Check the backend, then seed the registry from it.
    ///
    /// Fails before any frame is read if the backend does not answer.
    pub fn start(
        config: &Config,
        source: Box<dyn FrameSource>,
        localizer: Box<dyn FaceLocalizer>,
        store: Box<dyn FaceStore>,
    ) -> Result<Self, PipelineError> {
        if !store.ping() {
            return Err(PipelineError::BackendUnreachable {
                backend: store.name(),
            });
        }
        tracing::info!(backend = store.name(), "image store reachable");

        let policy = MatchPolicy::from_config(config);
        let mut registry = FaceRegistry::new(policy);
        if policy.compare {
            registry.load(load_templates(store.as_ref()))?;
        } else {
            tracing::info!("comparison disabled; every detected face will be stored");
            registry.load(Vec::new())?;
        }

        tracing::info!(
            source = %source.describe(),
            known = registry.len(),
            threshold = policy.threshold,
            cooldown_secs = config.save_cooldown_secs,
            "pipeline ready"
        );

        Ok(Self {
            source,
            localizer,
            store,
            registry,
            throttle: SaveThrottle::new(Duration::from_secs(config.save_cooldown_secs)),
            detector: config.detector.clone(),
            preview: config.preview_path.as_deref().map(Preview::new),
            summary: RunSummary::default(),
        })
    }

    /// Pull frames until the source ends or `stop` is raised.
    ///
    /// `stop` is checked between frames, so a store already in flight is
    /// always registered before the loop exits.
    pub fn run(&mut self, stop: &AtomicBool) -> StopReason {
        loop {
            if stop.load(Ordering::Relaxed) {
                tracing::info!("stop requested");
                return StopReason::Requested;
            }

            let mut frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(CaptureError::EndOfStream) => {
                    tracing::info!("frame source exhausted");
                    return StopReason::EndOfStream;
                }
                Err(e) => {
                    tracing::error!(error = %e, "frame capture failed; stopping");
                    return StopReason::CaptureFailed;
                }
            };

            let report = self.process_frame(&frame.image, Instant::now());
            tracing::trace!(
                sequence = frame.sequence,
                faces = report.faces.len(),
                accepted = report.accepted(),
                "frame processed"
            );

            if let Some(preview) = self.preview.as_mut() {
                annotate::draw(&mut frame.image, &report);
                preview.write(&frame.image);
            }
        }
    }

    /// Detect and handle every face in one frame.
    pub fn process_frame(&mut self, frame: &RgbImage, now: Instant) -> FrameReport {
        let rects = self.localizer.detect(frame, &self.detector);
        if !rects.is_empty() {
            tracing::debug!(count = rects.len(), "faces detected");
        }

        let mut report = FrameReport::default();
        for rect in rects {
            let outcome = self.process_face(frame, &rect, now);
            report.faces.push((rect, outcome));
        }
        self.summary.record(&report);
        report
    }

    fn process_face(&mut self, frame: &RgbImage, rect: &FaceRect, now: Instant) -> FaceOutcome {
        let Some(crop) = crop_face(frame, rect) else {
            tracing::debug!(?rect, "skipping degenerate face region");
            return FaceOutcome::Degenerate;
        };
        let candidate = match normalize_crop(&crop) {
            Ok(grid) => grid,
            Err(e) => {
                tracing::debug!(?rect, error = %e, "skipping face that could not be normalized");
                return FaceOutcome::Degenerate;
            }
        };

        if !self.throttle.is_open(now) {
            tracing::debug!(
                remaining_ms = self.throttle.remaining(now).as_millis() as u64,
                "save cooldown active; face skipped"
            );
            return FaceOutcome::Throttled;
        }

        let assessment = self.registry.assess(&candidate);
        if !assessment.is_new {
            let best = assessment.best.unwrap_or_default();
            tracing::debug!(best, "face already known");
            return FaceOutcome::Duplicate { best };
        }

        // The window starts with the attempt, whether or not it succeeds.
        self.throttle.mark(now);
        match self.store.store(&crop) {
            Ok(id) => {
                tracing::info!(
                    id = %id,
                    width = crop.width(),
                    height = crop.height(),
                    best = ?assessment.best,
                    "new face stored"
                );
                self.registry.accept(id.clone(), candidate);
                FaceOutcome::Accepted { id }
            }
            Err(e) => {
                tracing::warn!(backend = self.store.name(), error = %e, "failed to store new face");
                FaceOutcome::StoreFailed
            }
        }
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}

/// Fetch every stored image and normalize it into a template.
fn load_templates(store: &dyn FaceStore) -> Vec<FaceTemplate> {
    let stored = store.load_all(None);
    let mut templates = Vec::with_capacity(stored.len());
    for face in stored {
        match template_from_stored(&face.id, &face.image) {
            Ok(template) => templates.push(template),
            Err(e) => tracing::warn!(id = %face.id, error = %e, "skipping stored face"),
        }
    }
    templates
}
