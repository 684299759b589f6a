//! In-process demo wiring.
//!
//! Stands up a controller, two page-like target peers, a peer with no
//! destination, a dead link the launcher can revive, and a
//! transcription worker, all talking over real links, then drives one
//! of a few scripted session shapes against them. The demo peers print
//! what they observe; that output is the user-facing surface of the
//! binary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sotto_runtime::channel::link;
use sotto_runtime::dispatch::{Dispatcher, Handlers, Reply};
use sotto_runtime::pool::{KeepAlive, PoolError, ResourceFactory};
use sotto_runtime::session::{
    CaptureProvider, Device, Launcher, Orchestrator, Peers, Phase, Recording, SessionDeps,
    SessionError, StartOutcome,
};
use sotto_runtime::RuntimeConfig;
use sotto_types::{EndpointId, SessionId};
use sotto_wire::{Call, Stage, WireError};

/// The session shapes the demo can play out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Script {
    /// One session that records briefly and delivers its transcript.
    Happy,
    /// A second start supersedes the first session mid-capture.
    Supersede,
    /// An explicit finish cuts an endless capture short.
    Finish,
    /// The target refuses preparation; the session ends in an error.
    Refused,
    /// The target's link is dead at start; the launcher revives it.
    Relaunch,
}

/// A page-like peer: accepts preparation, tracks its open sessions,
/// and prints every stage it is told about.
struct PagePeer {
    name: String,
    accepts: bool,
    sessions: Mutex<HashSet<SessionId>>,
}

#[async_trait]
impl Handlers for PagePeer {
    async fn handle_request(&self, call: Call) -> Reply {
        match call {
            Call::AreYouThere(_) => Reply::Value(json!(true)),
            Call::PrepareToSession { session_id } => {
                if !self.accepts {
                    return Reply::Error(WireError::new(
                        "NoTargetError",
                        "no valid destination selected",
                    ));
                }
                self.sessions.lock().insert(session_id);
                println!("[{}] preparing {session_id}", self.name);
                Reply::Value(Value::Null)
            }
            _ => Reply::Unhandled,
        }
    }

    async fn handle_notification(&self, call: Call) {
        let Call::SessionEvent(event) = call else {
            return;
        };
        if event.stage.is_terminal() && !self.sessions.lock().remove(&event.session_id) {
            tracing::warn!(
                peer = %self.name,
                session = %event.session_id,
                "terminal event for a session this peer never prepared"
            );
        }
        match event.stage {
            Stage::Done => {
                let text = event.text.as_deref().unwrap_or("");
                println!("[{}] done: {text}", self.name);
            }
            Stage::Error => match event.error {
                Some(error) => println!("[{}] error: {error}", self.name),
                None => println!("[{}] error", self.name),
            },
            stage => println!("[{}] {stage}", self.name),
        }
    }
}

/// Worker peer that "transcribes" whatever payload it receives.
struct Transcriber;

#[async_trait]
impl Handlers for Transcriber {
    async fn handle_request(&self, call: Call) -> Reply {
        match call {
            Call::AreYouThere(_) => Reply::Value(json!(true)),
            Call::RunWork { payload, .. } => {
                let heard = payload.as_str().unwrap_or("<binary>").to_string();
                Reply::Value(json!(format!("transcript of {heard}")))
            }
            _ => Reply::Unhandled,
        }
    }
}

/// Capture provider whose recordings run for a fixed length.
struct TimedCapture {
    len: Duration,
}

#[async_trait]
impl CaptureProvider for TimedCapture {
    async fn begin(
        &self,
        device: &Device,
        session: SessionId,
    ) -> Result<Box<dyn Recording>, SessionError> {
        println!("(capture) {device} recording {session}");
        Ok(Box::new(TimedRecording {
            len: self.len,
            device: device.id.clone(),
        }))
    }
}

struct TimedRecording {
    len: Duration,
    device: String,
}

#[async_trait]
impl Recording for TimedRecording {
    async fn completed(&mut self) {
        tokio::time::sleep(self.len).await;
    }

    async fn finish(self: Box<Self>) -> Result<Value, SessionError> {
        Ok(json!(format!("audio from {}", self.device)))
    }
}

/// Device factory that numbers the devices it opens.
#[derive(Default)]
struct DemoDevices {
    opened: AtomicUsize,
}

#[async_trait]
impl ResourceFactory for DemoDevices {
    type Resource = Device;

    async fn create(&self) -> Result<Device, PoolError> {
        let device = Device::new(format!("mic-{}", self.opened.fetch_add(1, Ordering::SeqCst)));
        println!("(device) {device} opened");
        Ok(device)
    }

    async fn destroy(&self, device: Device) -> Result<(), PoolError> {
        println!("(device) {device} closed");
        Ok(())
    }
}

/// All demo peers are wired at startup, so a launch request means one
/// of them vanished mid-run.
struct PrewiredOnly;

#[async_trait]
impl Launcher for PrewiredOnly {
    async fn launch(&self, peer: &EndpointId) -> Result<(), SessionError> {
        Err(SessionError::LaunchFailed {
            peer: peer.clone(),
            reason: "demo peers are wired at startup".into(),
        })
    }
}

/// Wires a fresh page under the requested name and announces it ready.
struct Relauncher {
    peers: Arc<Peers>,
}

#[async_trait]
impl Launcher for Relauncher {
    async fn launch(&self, peer: &EndpointId) -> Result<(), SessionError> {
        println!("(launcher) relaunching {peer}");
        let far = wire(&self.peers, peer.as_str(), page(peer.as_str(), true));
        far.notify(Call::Ready).await?;
        Ok(())
    }
}

fn wire(peers: &Arc<Peers>, name: &str, handlers: Arc<dyn Handlers>) -> Arc<Dispatcher> {
    let (near, far) = link("controller", name);
    let near_side = Dispatcher::spawn(near);
    near_side.set_handlers(peers.ready_handlers(EndpointId::new(name)));
    let far_side = Dispatcher::spawn(far);
    far_side.set_handlers(handlers);
    peers.register(EndpointId::new(name), near_side);
    far_side
}

/// Registers `name` with a link whose far side is already gone; the
/// first send toward it fails with a closed channel.
fn wire_dead(peers: &Arc<Peers>, name: &str) {
    let (near, _far) = link("controller", name);
    let near_side = Dispatcher::spawn(near);
    near_side.set_handlers(peers.ready_handlers(EndpointId::new(name)));
    peers.register(EndpointId::new(name), near_side);
}

fn page(name: &str, accepts: bool) -> Arc<dyn Handlers> {
    Arc::new(PagePeer {
        name: name.to_string(),
        accepts,
        sessions: Mutex::new(HashSet::new()),
    })
}

/// Plays `script` against freshly wired in-process peers.
pub async fn run(script: Script, config: &RuntimeConfig) -> Result<()> {
    let peers = Arc::new(Peers::new());
    wire(&peers, "ctx1", page("ctx1", true));
    wire(&peers, "ctx2", page("ctx2", true));
    wire(&peers, "void", page("void", false));
    wire(&peers, "worker", Arc::new(Transcriber));
    wire_dead(&peers, "ctx3");

    let capture_len = match script {
        Script::Finish => Duration::from_secs(3600),
        _ => Duration::from_millis(200),
    };
    let launcher: Arc<dyn Launcher> = match script {
        Script::Relaunch => Arc::new(Relauncher {
            peers: Arc::clone(&peers),
        }),
        _ => Arc::new(PrewiredOnly),
    };
    let deps = SessionDeps {
        peers: Arc::clone(&peers),
        launcher,
        capture: Arc::new(TimedCapture { len: capture_len }),
        devices: KeepAlive::new(
            "devices",
            Arc::new(DemoDevices::default()),
            config.keep_alive_grace(),
        ),
        worker: EndpointId::new("worker"),
    };
    let orchestrator = Orchestrator::new(deps);

    match script {
        Script::Happy => {
            started(&orchestrator, "ctx1")?;
        }
        Script::Supersede => {
            started(&orchestrator, "ctx1")?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            match orchestrator.start("ctx2")? {
                StartOutcome::Queued => println!("superseding: ctx2 queued behind ctx1"),
                StartOutcome::Started(id) => println!("{id} started toward ctx2"),
            }
        }
        Script::Finish => {
            started(&orchestrator, "ctx1")?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            println!("finishing early");
            orchestrator.finish()?;
        }
        Script::Refused => {
            started(&orchestrator, "void")?;
        }
        Script::Relaunch => {
            started(&orchestrator, "ctx3")?;
        }
    }

    settle(&orchestrator).await
}

fn started(orchestrator: &Orchestrator, target: &str) -> Result<SessionId> {
    match orchestrator.start(target)? {
        StartOutcome::Started(id) => {
            println!("{id} started toward {target}");
            Ok(id)
        }
        StartOutcome::Queued => anyhow::bail!("expected an idle orchestrator"),
    }
}

async fn settle(orchestrator: &Orchestrator) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while orchestrator.phase() != Phase::Idle {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("sessions did not settle")?;
    println!("all sessions settled");
    Ok(())
}
