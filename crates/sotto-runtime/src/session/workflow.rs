//! The per-session workflow.
//!
//! One session walks a fixed sequence against its target and the
//! worker:
//!
//! ```text
//! ensure target -> prepareToSession -> loading -> acquire device
//!     -> begin capture -> active -> (completed | interrupted)
//!     -> processing -> runWork -> release device -> done{text}
//! ```
//!
//! Cancellation is cooperative. The control command is consulted at
//! checkpoints between the steps above and while the capture runs;
//! work already past a checkpoint completes first. A cancelled
//! session stops quietly at the next checkpoint and sends nothing
//! further to its target. Any other failure becomes a terminal
//! `error` stage event.

use std::sync::Arc;

use serde_json::Value;
use sotto_types::{EndpointId, ErrorCode, SessionId};
use sotto_wire::{Call, SessionEvent, Stage};

use crate::dispatch::Dispatcher;
use crate::pool::KeepAlive;

use super::control::{Command, ControlHandle};
use super::error::SessionError;
use super::peers::Peers;
use super::traits::{CaptureProvider, Device, Launcher};

/// Shared collaborators a session runs against. Cheap to clone, one
/// clone per session.
#[derive(Clone)]
pub struct SessionDeps {
    /// Registry of reachable endpoints.
    pub peers: Arc<Peers>,
    /// Brings absent targets back up.
    pub launcher: Arc<dyn Launcher>,
    /// Starts captures on leased devices.
    pub capture: Arc<dyn CaptureProvider>,
    /// Keep-alive pool of capture devices.
    pub devices: KeepAlive<Device>,
    /// The endpoint that turns captured payloads into text.
    pub worker: EndpointId,
}

pub(crate) struct SessionCtx {
    pub session: SessionId,
    pub target: EndpointId,
    pub control: ControlHandle,
    pub deps: SessionDeps,
}

enum SessionEnd {
    Delivered,
    Cancelled,
}

/// Runs one session to its terminal outcome. Never returns an error;
/// failures are reported to the target instead.
pub(crate) async fn run_session(mut ctx: SessionCtx) {
    let session = ctx.session;
    tracing::info!(%session, target = %ctx.target, "session started");
    match drive(&mut ctx).await {
        Ok(SessionEnd::Delivered) => tracing::info!(%session, "session delivered"),
        Ok(SessionEnd::Cancelled) => tracing::debug!(%session, "session cancelled"),
        Err(err) => report_failure(&ctx, &err).await,
    }
}

async fn drive(ctx: &mut SessionCtx) -> Result<SessionEnd, SessionError> {
    let target = ctx
        .deps
        .peers
        .ensure_available(&ctx.target, ctx.deps.launcher.as_ref())
        .await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    target
        .request(Call::PrepareToSession { session_id: ctx.session })
        .await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    notify_stage(&target, SessionEvent::stage(ctx.session, Stage::Loading)).await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    let lease = ctx.deps.devices.acquire().await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    let mut recording = ctx.deps.capture.begin(lease.resource(), ctx.session).await?;
    notify_stage(&target, SessionEvent::stage(ctx.session, Stage::Active)).await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    // Capture until it ends on its own or the control interrupts it.
    tokio::select! {
        () = recording.completed() => {}
        command = ctx.control.interrupted() => {
            if command == Command::Cancel {
                return Ok(SessionEnd::Cancelled);
            }
        }
    }
    let payload = recording.finish().await?;

    notify_stage(&target, SessionEvent::stage(ctx.session, Stage::Processing)).await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    let worker = ctx
        .deps
        .peers
        .get(&ctx.deps.worker)
        .ok_or_else(|| SessionError::UnknownPeer {
            peer: ctx.deps.worker.clone(),
        })?;
    let result = worker
        .request(Call::RunWork {
            payload,
            transferable_data: None,
        })
        .await?;
    if ctx.control.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    // Hand the device back before announcing the result, so a queued
    // session can acquire while the target renders.
    lease.release();
    let text = match result {
        Value::String(text) => text,
        other => other.to_string(),
    };
    notify_stage(&target, SessionEvent::done(ctx.session, text)).await?;
    Ok(SessionEnd::Delivered)
}

/// Reports a failed session to its target as a terminal `error`
/// stage. Cancelled sessions end silently.
async fn report_failure(ctx: &SessionCtx, err: &SessionError) {
    tracing::error!(
        session = %ctx.session,
        code = err.code(),
        error = %err,
        "session failed"
    );
    if ctx.control.is_cancelled() {
        return;
    }
    let Some(target) = ctx.deps.peers.get(&ctx.target) else {
        return;
    };
    let event = SessionEvent::error(ctx.session, err.to_wire());
    if let Err(send_err) = target.notify(Call::SessionEvent(event)).await {
        tracing::warn!(
            session = %ctx.session,
            error = %send_err,
            "terminal error event undeliverable"
        );
    }
}

async fn notify_stage(target: &Dispatcher, event: SessionEvent) -> Result<(), SessionError> {
    tracing::debug!(session = %event.session_id, stage = %event.stage, "stage");
    target.notify(Call::SessionEvent(event)).await?;
    Ok(())
}
