//! Capture loop
//!
//! Reads frames at `capture_interval`, consults the motion gate on every
//! Nth frame and pushes moving frames into the queue. End-of-stream or a
//! read failure re-initializes the source; a read failure or a failed
//! re-initialization backs off before the next attempt.

use super::{pause, WorkerContext};
use crate::capture::{Frame, FrameSource};
use crate::error::Result;
use crate::image_processor::MotionGate;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{spawn_blocking, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Blocking half of the loop; moved in and out of `spawn_blocking`
struct CaptureStage {
    source: Box<dyn FrameSource>,
    gate: Box<dyn MotionGate>,
    frames: u64,
}

enum Step {
    Queued(Frame),
    Skipped,
    EndOfStream,
}

impl CaptureStage {
    fn step(&mut self, motion_check_every: u64) -> Result<Step> {
        let Some(frame) = self.source.read_frame()? else {
            return Ok(Step::EndOfStream);
        };

        self.frames += 1;
        if self.frames % motion_check_every == 0 && self.gate.has_motion(&frame.image) {
            Ok(Step::Queued(frame))
        } else {
            Ok(Step::Skipped)
        }
    }

    fn reinitialize(&mut self) -> Result<()> {
        self.gate.reset();
        self.source.initialize()
    }
}

pub async fn run(ctx: Arc<WorkerContext>, cancel: CancellationToken) -> Result<()> {
    info!("Starting video capture loop");

    let stage = CaptureStage {
        source: (ctx.source_factory)(),
        gate: (ctx.motion_factory)(),
        frames: 0,
    };

    let (stage, init) = blocking(stage, |s| s.source.initialize()).await?;
    if let Err(e) = init {
        error!(error = %e, "Failed to initialize camera, exiting capture loop");
        release(stage).await;
        return Err(e);
    }

    let (stage, result) = capture_loop(&ctx, &cancel, stage).await;
    if let Some(stage) = stage {
        release(stage).await;
    }
    info!("Capture loop stopped");
    result
}

/// Returns the stage for release, or `None` if it was lost to a panic
async fn capture_loop(
    ctx: &WorkerContext,
    cancel: &CancellationToken,
    mut stage: CaptureStage,
) -> (Option<CaptureStage>, Result<()>) {
    let settings = ctx.settings;
    let every = settings.motion_check_every;

    while !cancel.is_cancelled() {
        let started = Instant::now();

        let step = match blocking(stage, move |s| s.step(every)).await {
            Ok((returned, step)) => {
                stage = returned;
                step
            }
            Err(e) => return (None, Err(e.into())),
        };

        match step {
            Ok(Step::Queued(frame)) => {
                let seq = frame.seq;
                if let Some(dropped) = ctx.queue.push(frame) {
                    debug!(dropped_seq = dropped.seq, "Queue full, replaced oldest frame");
                }
                debug!(seq = seq, "Added frame to processing queue");
            }
            Ok(Step::Skipped) => {}
            Ok(Step::EndOfStream) | Err(_) => {
                let read_failed = step.is_err();
                match &step {
                    Err(e) => warn!(error = %e, "Frame read failed, reinitializing camera"),
                    _ => debug!("End of stream, reinitializing camera"),
                }

                let reinit = match blocking(stage, |s| s.reinitialize()).await {
                    Ok((returned, reinit)) => {
                        stage = returned;
                        reinit
                    }
                    Err(e) => return (None, Err(e.into())),
                };

                if let Err(e) = &reinit {
                    error!(error = %e, "Failed to reinitialize camera after failure");
                }
                if (read_failed || reinit.is_err()) && !pause(cancel, settings.reinit_backoff).await
                {
                    break;
                }
                continue;
            }
        }

        let remaining = settings.capture_interval.saturating_sub(started.elapsed());
        if !remaining.is_zero() && !pause(cancel, remaining).await {
            break;
        }
    }

    (Some(stage), Ok(()))
}

/// Run `f` against the stage on the blocking pool and hand the stage back
async fn blocking<T, F>(
    mut stage: CaptureStage,
    f: F,
) -> std::result::Result<(CaptureStage, T), JoinError>
where
    T: Send + 'static,
    F: FnOnce(&mut CaptureStage) -> T + Send + 'static,
{
    spawn_blocking(move || {
        let out = f(&mut stage);
        (stage, out)
    })
    .await
}

async fn release(stage: CaptureStage) {
    if let Err(e) = blocking(stage, |s| s.source.release()).await {
        warn!(error = %e, "Failed to release frame source");
    }
}
