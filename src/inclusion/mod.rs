//! Adding and removing nodes.
//!
//! Both directions share one sequence:
//!
//! ```text
//! LearnRequested → AwaitingLearnReady → AwaitingNodeFound → AwaitingNodeType
//!     → AwaitingCompletion → Done | Failed | TimedOut
//! ```
//!
//! Two tokens control cancellation. The abort token is honored only before
//! NodeFound (setup, LearnReady and the wait for a node), when the
//! controller can still be stopped cleanly. The cancel token is honored everywhere; past the point
//! of no return it stops the controller best-effort and gives up.

mod sequence;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::function::DeviceClass;
use crate::NodeId;

pub(crate) use sequence::{add_node, remove_node};

/// Boxed future for inclusion hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs on its own task once the controller is in learn mode.
pub type ControllerReady = Box<dyn FnOnce() + Send + 'static>;

/// Runs after a sleeping node joined, before it is told to go back to sleep.
pub type WakeUpInit = Box<dyn FnOnce(NodeId) -> BoxFuture<'static, Result<()>> + Send + 'static>;

/// Per-phase deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTimeouts {
    /// From the learn request to LearnReady.
    pub learn_ready: Duration,
    /// From the learn request to NodeFound and the node type.
    pub node_found: Duration,
    /// From the node type to completion for slave nodes.
    pub slave: Duration,
    /// From the node type to completion for controller nodes.
    pub controller: Duration,
}

impl NodeTimeouts {
    /// Firmware timings for adding a node to a mesh with the given number of
    /// listening and known nodes.
    pub fn add(listening_nodes: usize, known_nodes: usize) -> Self {
        let slave = Duration::from_secs(76) + Duration::from_millis(217 * listening_nodes as u64);
        Self {
            learn_ready: Duration::from_secs(10),
            node_found: Duration::from_secs(60),
            slave,
            controller: slave + Duration::from_millis(732 * known_nodes as u64),
        }
    }

    pub fn remove() -> Self {
        Self {
            learn_ready: Duration::from_millis(200),
            node_found: Duration::from_secs(60),
            slave: Duration::from_secs(14),
            controller: Duration::from_secs(14),
        }
    }
}

/// Sequence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceState {
    Idle,
    LearnRequested,
    AwaitingLearnReady,
    AwaitingNodeFound,
    AwaitingNodeType,
    AwaitingCompletion,
    Done,
    Failed,
    TimedOut,
}

impl SequenceState {
    pub const ALL: [SequenceState; 9] = [
        Self::Idle,
        Self::LearnRequested,
        Self::AwaitingLearnReady,
        Self::AwaitingNodeFound,
        Self::AwaitingNodeType,
        Self::AwaitingCompletion,
        Self::Done,
        Self::Failed,
        Self::TimedOut,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }

    /// Whether `self → to` is a legal step.
    pub fn can_transition(self, to: SequenceState) -> bool {
        use SequenceState::*;

        match (self, to) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Idle, LearnRequested) => true,
            (LearnRequested, AwaitingLearnReady) => true,
            (AwaitingLearnReady, AwaitingNodeFound | TimedOut | Done) => true,
            (AwaitingNodeFound, AwaitingNodeType | TimedOut | Done) => true,
            (AwaitingNodeType, AwaitingCompletion | TimedOut) => true,
            (AwaitingCompletion, Done | TimedOut) => true,
            _ => false,
        }
    }
}

/// Outcome of adding a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionResult {
    pub node_id: NodeId,
    pub device_class: DeviceClass,
    pub command_classes: Vec<u8>,
    /// The node was found but may still have failed to finish joining.
    pub completed: bool,
}

/// Outcome of removing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalResult {
    pub node_id: NodeId,
    pub completed: bool,
}

/// Options for [`crate::ZWaveClient::add_device`].
#[derive(Default)]
pub struct AddDeviceOptions {
    /// Listening nodes in the mesh; scales the completion deadlines.
    pub listening_nodes: usize,
    /// Replaces the firmware deadlines.
    pub timeouts: Option<NodeTimeouts>,
    pub controller_ready: Option<ControllerReady>,
    pub wake_up_init: Option<WakeUpInit>,
    pub abort: CancellationToken,
    pub cancel: CancellationToken,
}

impl AddDeviceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listening_nodes(mut self, count: usize) -> Self {
        self.listening_nodes = count;
        self
    }

    pub fn timeouts(mut self, timeouts: NodeTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn on_controller_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.controller_ready = Some(Box::new(callback));
        self
    }

    pub fn on_wake_up_init<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(NodeId) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.wake_up_init = Some(Box::new(move |node_id| Box::pin(hook(node_id))));
        self
    }

    pub fn abort_token(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Options for [`crate::ZWaveClient::remove_device`].
#[derive(Default)]
pub struct RemoveDeviceOptions {
    pub timeouts: Option<NodeTimeouts>,
    pub controller_ready: Option<ControllerReady>,
    pub abort: CancellationToken,
    pub cancel: CancellationToken,
}

impl RemoveDeviceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeouts(mut self, timeouts: NodeTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn on_controller_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.controller_ready = Some(Box::new(callback));
        self
    }

    pub fn abort_token(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}
