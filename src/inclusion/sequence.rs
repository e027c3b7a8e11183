use std::future::Future;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    AddDeviceOptions, ControllerReady, InclusionResult, NodeTimeouts, RemovalResult,
    RemoveDeviceOptions, SequenceState,
};
use crate::client::ClientInner;
use crate::command_class::{wake_up, CommandClassId};
use crate::error::{Result, ZWaveError};
use crate::function::{
    AddNodeToNetwork, DeviceClass, FunctionId, GetSucNodeId, MemoryGetId, NodeMode, NodeStatus,
    NodeUpdate, RemoveNodeFromNetwork, SerialApiGetInitData, TransmitOptions,
};
use crate::link::LinkEvent;
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Add,
    Remove,
}

impl Kind {
    fn function(self) -> FunctionId {
        match self {
            Self::Add => FunctionId::AddNodeToNetwork,
            Self::Remove => FunctionId::RemoveNodeFromNetwork,
        }
    }

    fn learn_mode(self) -> NodeMode {
        match self {
            Self::Add => NodeMode::ADD,
            Self::Remove => NodeMode::REMOVE,
        }
    }

    /// Status that ends a successful handshake.
    fn success_status(self) -> NodeStatus {
        match self {
            Self::Add => NodeStatus::ProtocolDone,
            Self::Remove => NodeStatus::Done,
        }
    }
}

enum Wait {
    Update(NodeUpdate),
    TimedOut,
    Aborted,
    Cancelled,
}

struct Found {
    node_id: NodeId,
    device_class: DeviceClass,
    command_classes: Vec<u8>,
    completed: bool,
}

async fn abort_requested(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

struct Sequence<'a> {
    client: &'a ClientInner,
    kind: Kind,
    state: SequenceState,
    callback_id: u8,
    node_id: NodeId,
    events: broadcast::Receiver<LinkEvent>,
}

impl<'a> Sequence<'a> {
    fn new(client: &'a ClientInner, kind: Kind) -> Self {
        Self {
            client,
            kind,
            state: SequenceState::Idle,
            callback_id: client.callback_ids.next_id(),
            node_id: 0,
            events: client.link.subscribe(),
        }
    }

    fn transition(&mut self, to: SequenceState) {
        if self.state.can_transition(to) {
            tracing::debug!("{:?} node: {:?} -> {:?}", self.kind, self.state, to);
            self.state = to;
        } else {
            tracing::warn!("{:?} node: rejected {:?} -> {:?}", self.kind, self.state, to);
        }
    }

    async fn send_mode(&self, mode: NodeMode, callback_id: u8, cancel: &CancellationToken) -> Result<()> {
        match self.kind {
            Kind::Add => {
                self.client
                    .call(&AddNodeToNetwork { mode, callback_id }, cancel)
                    .await
            }
            Kind::Remove => {
                self.client
                    .call(&RemoveNodeFromNetwork { mode, callback_id }, cancel)
                    .await
            }
        }
    }

    /// Wait for a callback whose status `accept` takes.
    async fn wait_for(
        &mut self,
        accept: impl Fn(NodeStatus) -> bool,
        deadline: Instant,
        abort: Option<&CancellationToken>,
        cancel: &CancellationToken,
    ) -> Result<Wait> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Wait::Cancelled),
                _ = abort_requested(abort) => return Ok(Wait::Aborted),
                _ = tokio::time::sleep_until(deadline) => return Ok(Wait::TimedOut),
                event = self.events.recv() => event,
            };

            match event {
                Ok(LinkEvent::Data(frame)) if frame.is_request() => {
                    let Some(update) =
                        NodeUpdate::parse(self.kind.function(), self.callback_id, frame.payload())
                    else {
                        continue;
                    };
                    tracing::debug!("{:?} node: {:?} for node {}", self.kind, update.status, update.node_id);
                    if accept(update.status) {
                        return Ok(Wait::Update(update));
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Node sequence lagged, {} link events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
            }
        }
    }

    /// Stop(cb), bounded wait for Done, then the final Stop(0). The final
    /// Stop(0) goes out on every path, cancelled or not.
    async fn stop(&mut self, cancel: &CancellationToken) -> Result<()> {
        let stopped = self.stop_and_wait_done(cancel).await;
        self.final_stop().await;
        stopped
    }

    async fn stop_and_wait_done(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.send_mode(NodeMode::STOP, self.callback_id, cancel).await?;
        let deadline = Instant::now() + self.client.config.inclusion.stop_done_timeout;
        match self
            .wait_for(|s| s == NodeStatus::Done, deadline, None, cancel)
            .await?
        {
            Wait::Cancelled => Err(ZWaveError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Stop(0) on a fresh token so an already cancelled one cannot suppress it.
    async fn final_stop(&self) {
        if let Err(e) = self.send_mode(NodeMode::STOP, 0, &CancellationToken::new()).await {
            tracing::warn!("{:?} node: final stop failed: {}", self.kind, e);
        }
    }

    async fn timed_out(&mut self, phase: &'static str, cancel: &CancellationToken) -> ZWaveError {
        tracing::debug!("{:?} node: timed out waiting for {}", self.kind, phase);
        if let Err(e) = self.stop(cancel).await {
            tracing::warn!("Stopping controller after timeout failed: {}", e);
        }
        self.transition(SequenceState::TimedOut);
        ZWaveError::NodeTimeout {
            phase,
            node_id: self.node_id,
        }
    }

    /// Best-effort Stop(0), then give up.
    async fn cancelled(&mut self) -> ZWaveError {
        tracing::debug!("{:?} node: cancelled in {:?}", self.kind, self.state);
        self.final_stop().await;
        self.transition(SequenceState::Failed);
        ZWaveError::Cancelled
    }

    async fn failed(&mut self, error: ZWaveError, cancel: &CancellationToken) -> ZWaveError {
        if let Err(e) = self.stop(cancel).await {
            tracing::warn!("Stopping controller after failure failed: {}", e);
        }
        self.transition(SequenceState::Failed);
        error
    }

    async fn run(
        &mut self,
        timeouts: NodeTimeouts,
        controller_ready: Option<ControllerReady>,
        abort: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Result<Found> {
        use NodeStatus::*;

        self.transition(SequenceState::LearnRequested);
        if let Err(e) = self.send_mode(self.kind.learn_mode(), self.callback_id, cancel).await {
            return Err(match e {
                ZWaveError::Cancelled => self.cancelled().await,
                other => {
                    self.transition(SequenceState::Failed);
                    other
                }
            });
        }
        let started = Instant::now();

        self.transition(SequenceState::AwaitingLearnReady);
        match self
            .wait_for(
                |s| matches!(s, LearnReady | NotPrimary | Failed),
                started + timeouts.learn_ready,
                Some(abort),
                cancel,
            )
            .await?
        {
            Wait::Update(u) if u.status == LearnReady => {}
            Wait::Update(u) if u.status == NotPrimary => {
                return Err(self.failed(ZWaveError::NotPrimary, cancel).await);
            }
            Wait::Update(_) => {
                let error = ZWaveError::Protocol("controller failed to enter learn mode".into());
                return Err(self.failed(error, cancel).await);
            }
            Wait::TimedOut => return Err(self.timed_out("LearnReady", cancel).await),
            Wait::Aborted => {
                tracing::debug!("{:?} node: aborted before LearnReady", self.kind);
                if let Err(e) = self.stop(cancel).await {
                    tracing::warn!("Stopping controller after abort failed: {}", e);
                }
                self.transition(SequenceState::Done);
                return Err(ZWaveError::Aborted);
            }
            Wait::Cancelled => return Err(self.cancelled().await),
        }

        if let Some(callback) = controller_ready {
            tracing::debug!("{:?} node: controller ready", self.kind);
            tokio::spawn(async move { callback() });
        }

        self.transition(SequenceState::AwaitingNodeFound);
        let node_found_deadline = started + timeouts.node_found;
        match self
            .wait_for(
                |s| matches!(s, NodeFound | Failed),
                node_found_deadline,
                Some(abort),
                cancel,
            )
            .await?
        {
            Wait::Update(u) if u.status == NodeFound => {}
            Wait::Update(_) => {
                let error = ZWaveError::Protocol("controller failed while waiting for a node".into());
                return Err(self.failed(error, cancel).await);
            }
            Wait::TimedOut => return Err(self.timed_out("NodeFound", cancel).await),
            Wait::Aborted => self.abort_before_node_found(node_found_deadline, cancel).await?,
            Wait::Cancelled => return Err(self.cancelled().await),
        }

        // Past this point only the cancel token is honored.
        self.transition(SequenceState::AwaitingNodeType);
        let update = match self
            .wait_for(
                |s| matches!(s, Slave | Controller | Failed),
                node_found_deadline,
                None,
                cancel,
            )
            .await?
        {
            Wait::Update(u) => u,
            Wait::TimedOut => return Err(self.timed_out("node type", cancel).await),
            Wait::Aborted | Wait::Cancelled => return Err(self.cancelled().await),
        };
        self.node_id = update.node_id;

        let completion_timeout = match update.status {
            Slave => timeouts.slave,
            Controller => timeouts.controller,
            _ => {
                let error = ZWaveError::Protocol(format!("node {} failed to join", update.node_id));
                return Err(self.failed(error, cancel).await);
            }
        };

        self.transition(SequenceState::AwaitingCompletion);
        let success = self.kind.success_status();
        let completed = match self
            .wait_for(
                |s| s == success || s == Failed,
                Instant::now() + completion_timeout,
                None,
                cancel,
            )
            .await?
        {
            Wait::Update(u) => u.status == success,
            Wait::TimedOut => {
                let phase = match self.kind {
                    Kind::Add => "ProtocolDone",
                    Kind::Remove => "Done",
                };
                return Err(self.timed_out(phase, cancel).await);
            }
            Wait::Aborted | Wait::Cancelled => return Err(self.cancelled().await),
        };

        self.final_stop().await;
        self.transition(if completed {
            SequenceState::Done
        } else {
            SequenceState::Failed
        });

        Ok(Found {
            node_id: update.node_id,
            device_class: update.device_class.unwrap_or_default(),
            command_classes: update.command_classes,
            completed,
        })
    }

    /// Abort while waiting for a node. A node found while stopping wins.
    async fn abort_before_node_found(&mut self, deadline: Instant, cancel: &CancellationToken) -> Result<()> {
        tracing::debug!("{:?} node: aborted before NodeFound", self.kind);
        let outcome = match self.send_mode(NodeMode::STOP, self.callback_id, cancel).await {
            Ok(()) => {
                let bound = deadline.min(Instant::now() + self.client.config.inclusion.stop_done_timeout);
                self.wait_for(
                    |s| matches!(s, NodeStatus::NodeFound | NodeStatus::Done),
                    bound,
                    None,
                    cancel,
                )
                .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Wait::Update(u)) if u.status == NodeStatus::NodeFound => {
                tracing::debug!("{:?} node: node found while stopping, continuing", self.kind);
                Ok(())
            }
            Ok(Wait::Cancelled) | Err(ZWaveError::Cancelled) => Err(self.cancelled().await),
            other => {
                if let Err(e) = other {
                    tracing::warn!("Stopping controller after abort failed: {}", e);
                }
                self.final_stop().await;
                self.transition(SequenceState::Done);
                Err(ZWaveError::Aborted)
            }
        }
    }
}

/// Run a step before learn mode; either token ends it early.
async fn before_learn_mode<T>(
    step: impl Future<Output = Result<T>>,
    abort: &CancellationToken,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ZWaveError::Cancelled),
        _ = abort.cancelled() => {
            tracing::debug!("Node sequence aborted before learn mode");
            Err(ZWaveError::Aborted)
        }
        result = step => result,
    }
}

/// Stop whatever learn session the controller may still be in.
async fn stop_stale_session(client: &ClientInner, cancel: &CancellationToken) -> Result<()> {
    client
        .call(
            &AddNodeToNetwork {
                mode: NodeMode::STOP,
                callback_id: 0,
            },
            cancel,
        )
        .await?;
    tokio::select! {
        _ = cancel.cancelled() => Err(ZWaveError::Cancelled),
        _ = tokio::time::sleep(client.config.inclusion.stale_session_delay) => Ok(()),
    }
}

pub(crate) async fn add_node(client: &ClientInner, options: AddDeviceOptions) -> Result<InclusionResult> {
    let AddDeviceOptions {
        listening_nodes,
        timeouts,
        controller_ready,
        wake_up_init,
        abort,
        cancel,
    } = options;

    let (memory, init) = before_learn_mode(
        async {
            stop_stale_session(client, &cancel).await?;
            let memory = client.call(&MemoryGetId, &cancel).await?;
            let suc = client.call(&GetSucNodeId, &cancel).await?;
            if memory.node_id != suc {
                return Err(ZWaveError::NoSucController);
            }
            let init = client.call(&SerialApiGetInitData, &cancel).await?;
            Ok((memory, init))
        },
        &abort,
        &cancel,
    )
    .await?;
    let timeouts = timeouts.unwrap_or_else(|| NodeTimeouts::add(listening_nodes, init.node_ids.len()));

    tracing::info!("Adding node (home id {:08X})", memory.home_id);
    let found = Sequence::new(client, Kind::Add)
        .run(timeouts, controller_ready, &abort, &cancel)
        .await?;

    if found.completed && found.command_classes.contains(&(CommandClassId::WakeUp as u8)) {
        if let Some(hook) = wake_up_init {
            if let Err(e) = hook(found.node_id).await {
                tracing::warn!("Wake-up init for node {} failed: {}", found.node_id, e);
            }
            client
                .send_command_class(
                    found.node_id,
                    wake_up::no_more_information(),
                    TransmitOptions::ACK,
                    &cancel,
                )
                .await?;
        }
    }

    tracing::info!("Added node {} (completed: {})", found.node_id, found.completed);
    Ok(InclusionResult {
        node_id: found.node_id,
        device_class: found.device_class,
        command_classes: found.command_classes,
        completed: found.completed,
    })
}

pub(crate) async fn remove_node(client: &ClientInner, options: RemoveDeviceOptions) -> Result<RemovalResult> {
    let RemoveDeviceOptions {
        timeouts,
        controller_ready,
        abort,
        cancel,
    } = options;

    before_learn_mode(stop_stale_session(client, &cancel), &abort, &cancel).await?;

    let found = Sequence::new(client, Kind::Remove)
        .run(
            timeouts.unwrap_or_else(NodeTimeouts::remove),
            controller_ready,
            &abort,
            &cancel,
        )
        .await?;

    tracing::info!("Removed node {} (completed: {})", found.node_id, found.completed);
    Ok(RemovalResult {
        node_id: found.node_id,
        completed: found.completed,
    })
}
