//! Inference loop
//!
//! Pops frames, compresses and classifies them, feeds the confirmer and
//! hands a confirmed detection to the lifecycle controller. While an event
//! is open the loop idles and the streak is discarded.

use super::{pause, WorkerContext};
use crate::capture::Frame;
use crate::classifier::Prediction;
use crate::detection_confirmer::DetectionConfirmer;
use crate::error::{Error, Result};
use crate::image_processor::CompressedFrame;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub async fn run(ctx: Arc<WorkerContext>, cancel: CancellationToken) -> Result<()> {
    info!("Starting frame processing loop");

    let classifier = Arc::clone(&ctx.classifier);
    if let Err(e) = spawn_blocking(move || classifier.health_check()).await? {
        error!(error = %e, "Classifier unavailable, exiting processing loop");
        return Err(e);
    }

    let settings = ctx.settings;
    let mut confirmer = DetectionConfirmer::new(
        settings.confidence_threshold,
        settings.required_consecutive_frames,
    );
    let mut last_processed: Option<Instant> = None;

    while !cancel.is_cancelled() {
        if ctx.lifecycle.is_active() || ctx.store.is_unresolved().await {
            confirmer.reset();
            debug!("Open accident event, processing paused");
            if !pause(&cancel, settings.open_event_pause).await {
                break;
            }
            continue;
        }

        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = ctx.queue.pop(settings.pop_timeout) => frame,
        };
        let Some(frame) = frame else {
            continue;
        };

        if let Some(last) = last_processed {
            if last.elapsed() < settings.min_processing_interval {
                debug!(seq = frame.seq, "Throttled, frame skipped");
                continue;
            }
        }
        last_processed = Some(Instant::now());

        if let Err(e) = process_frame(&ctx, &mut confirmer, frame).await {
            error!(error = %e, "Error processing frame");
            if !pause(&cancel, settings.error_backoff).await {
                break;
            }
        }
    }

    info!("Processing loop stopped");
    Ok(())
}

async fn process_frame(
    ctx: &Arc<WorkerContext>,
    confirmer: &mut DetectionConfirmer,
    frame: Frame,
) -> Result<()> {
    let compressed = compress(ctx, &frame).await?;
    let compressed = Arc::new(compressed);

    let classifier = Arc::clone(&ctx.classifier);
    let input = Arc::clone(&compressed);
    let prediction = match spawn_blocking(move || classifier.classify(&input)).await? {
        Ok(prediction) => prediction,
        Err(e) => {
            warn!(seq = frame.seq, error = %e, "Prediction failed");
            Prediction::unknown()
        }
    };
    debug!(
        seq = frame.seq,
        label = %prediction.label,
        confidence = prediction.confidence,
        "Prediction"
    );

    if confirmer.observe(&prediction.label, prediction.confidence) {
        let jpeg = Arc::try_unwrap(compressed)
            .map(|c| c.jpeg)
            .unwrap_or_else(|shared| shared.jpeg.clone());
        ctx.lifecycle.handle_detection(jpeg).await;
    }
    Ok(())
}

async fn compress(ctx: &WorkerContext, frame: &Frame) -> Result<CompressedFrame> {
    let compressor = Arc::clone(&ctx.compressor);
    let image = Arc::clone(&frame.image);
    let job = spawn_blocking(move || compressor.compress(&image));

    match tokio::time::timeout(ctx.settings.compress_timeout, job).await {
        Ok(joined) => joined?,
        Err(_) => Err(Error::Internal(format!(
            "Image compression timed out after {:?}",
            ctx.settings.compress_timeout
        ))),
    }
}
