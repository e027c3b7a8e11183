//! Transaction state machine for one controller function.
//!
//! [`Transaction`] is the pure part: it takes one [`CallInput`] at a time
//! and returns the [`Action`]s the driver must perform. [`execute`] is the
//! driver. It is the only consumer of a call's inputs (link events, the
//! step/retry timer and the cancellation token), so transitions never race
//! and the outcome is resolved exactly once.
//!
//! ```text
//! Idle ─► SendingCommand ─► AwaitingAck ─┬─ Ack ─► AwaitingResponse ─► Completed
//!              ▲                         ├─ Ack (no return value) ──► Completed
//!              ├──────── Nack / timeout ─┤
//!              └─ RetryingAfterDelay ◄───┴─ Cancel byte
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Function;
use crate::config::FunctionCallConfig;
use crate::error::{Result, ZWaveError};
use crate::link::{LinkEvent, SerialLink};
use crate::protocol::{FrameType, Preamble};

/// Transaction state. A transaction is never reused after a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmitState {
    Idle,
    SendingCommand,
    AwaitingAck,
    AwaitingResponse,
    RetryingAfterDelay,
    Completed,
    Cancelled,
}

/// Transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmitTrigger {
    SendCommand,
    AwaitAck,
    AwaitResponse,
    Complete,
    RetryAfterDelay,
    Cancel,
}

impl TransmitState {
    pub const ALL: [TransmitState; 7] = [
        Self::Idle,
        Self::SendingCommand,
        Self::AwaitingAck,
        Self::AwaitingResponse,
        Self::RetryingAfterDelay,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Target state for `trigger`, or `None` if the pair is not permitted.
    pub fn next(self, trigger: TransmitTrigger) -> Option<TransmitState> {
        use TransmitState::*;
        use TransmitTrigger::*;

        match (self, trigger) {
            (Completed | Cancelled, _) => None,
            (_, Cancel) => Some(Cancelled),
            (Idle, SendCommand) => Some(SendingCommand),
            (SendingCommand, AwaitAck) => Some(AwaitingAck),
            (SendingCommand, Complete) => Some(Completed),
            (AwaitingAck, SendCommand) => Some(SendingCommand),
            (AwaitingAck, RetryAfterDelay) => Some(RetryingAfterDelay),
            (AwaitingAck, AwaitResponse) => Some(AwaitingResponse),
            (AwaitingAck, Complete) => Some(Completed),
            (RetryingAfterDelay, SendCommand) => Some(SendingCommand),
            (AwaitingResponse, SendCommand) => Some(SendingCommand),
            (AwaitingResponse, Complete) => Some(Completed),
            _ => None,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl TransmitTrigger {
    pub const ALL: [TransmitTrigger; 6] = [
        Self::SendCommand,
        Self::AwaitAck,
        Self::AwaitResponse,
        Self::Complete,
        Self::RetryAfterDelay,
        Self::Cancel,
    ];
}

/// Something that happened to the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallInput {
    Start,
    Control(Preamble),
    Unexpected(u8),
    /// A Response payload already accepted by the function's predicate.
    Response(Bytes),
    StepTimeout,
    RetryElapsed,
    Cancel,
}

/// How the call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Acknowledged, with the Response payload if the function has one.
    Success(Option<Bytes>),
    /// Attempts exhausted.
    Timeout,
    /// A byte other than Ack/Nack/Cancel arrived while awaiting the Ack.
    Protocol(u8),
    Cancelled,
}

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write the function's Request frame.
    Write,
    /// (Re)arm the step timer with the network timeout.
    ArmStepTimer,
    /// Arm the timer with the retry delay.
    ArmRetryTimer,
    DisarmTimer,
    /// Resolve the call. Emitted at most once per transaction.
    Resolve(Outcome),
}

/// Pure transaction state machine.
#[derive(Debug)]
pub struct Transaction {
    state: TransmitState,
    attempt: u32,
    max_attempts: u32,
    has_return_value: bool,
}

impl Transaction {
    pub fn new(max_attempts: u32, has_return_value: bool) -> Self {
        Self {
            state: TransmitState::Idle,
            attempt: 0,
            max_attempts,
            has_return_value,
        }
    }

    pub fn state(&self) -> TransmitState {
        self.state
    }

    /// Number of send attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Feed one input. Inputs that do not apply to the current state are
    /// ignored.
    pub fn handle(&mut self, input: CallInput) -> Vec<Action> {
        use TransmitState::*;

        let mut actions = Vec::new();
        match (self.state, input) {
            (Idle, CallInput::Start) => {
                self.fire(TransmitTrigger::SendCommand, &mut actions);
            }
            (AwaitingAck, CallInput::Control(Preamble::Ack)) => {
                if self.has_return_value {
                    self.fire(TransmitTrigger::AwaitResponse, &mut actions);
                } else {
                    self.complete(Outcome::Success(None), &mut actions);
                }
            }
            (AwaitingAck, CallInput::Control(Preamble::Nack)) => {
                self.fire(TransmitTrigger::SendCommand, &mut actions);
            }
            (AwaitingAck, CallInput::Control(Preamble::Cancel)) => {
                self.fire(TransmitTrigger::RetryAfterDelay, &mut actions);
            }
            (AwaitingAck, CallInput::Unexpected(byte)) => {
                self.complete(Outcome::Protocol(byte), &mut actions);
            }
            (AwaitingResponse, CallInput::Response(payload)) => {
                self.complete(Outcome::Success(Some(payload)), &mut actions);
            }
            (AwaitingAck | AwaitingResponse, CallInput::StepTimeout) => {
                tracing::debug!("Step timeout in {:?} (attempt {})", self.state, self.attempt);
                self.fire(TransmitTrigger::SendCommand, &mut actions);
            }
            (RetryingAfterDelay, CallInput::RetryElapsed) => {
                self.fire(TransmitTrigger::SendCommand, &mut actions);
            }
            (_, CallInput::Cancel) => {
                self.fire(TransmitTrigger::Cancel, &mut actions);
            }
            (state, input) => {
                tracing::trace!("Ignoring {:?} in {:?}", input, state);
            }
        }
        actions
    }

    /// Apply a transition and run the target state's entry behavior.
    fn fire(&mut self, trigger: TransmitTrigger, actions: &mut Vec<Action>) -> bool {
        let Some(next) = self.state.next(trigger) else {
            tracing::debug!("Rejected {:?} in {:?}", trigger, self.state);
            return false;
        };
        tracing::trace!("{:?} --{:?}--> {:?}", self.state, trigger, next);
        self.state = next;

        match next {
            TransmitState::SendingCommand => {
                self.attempt += 1;
                if self.attempt > self.max_attempts {
                    self.complete(Outcome::Timeout, actions);
                    return true;
                }
                actions.push(Action::Write);
                actions.push(Action::ArmStepTimer);
                self.fire(TransmitTrigger::AwaitAck, actions);
            }
            TransmitState::AwaitingResponse => actions.push(Action::ArmStepTimer),
            TransmitState::RetryingAfterDelay => actions.push(Action::ArmRetryTimer),
            TransmitState::Cancelled => {
                actions.push(Action::DisarmTimer);
                actions.push(Action::Resolve(Outcome::Cancelled));
            }
            _ => {}
        }
        true
    }

    fn complete(&mut self, outcome: Outcome, actions: &mut Vec<Action>) {
        if self.fire(TransmitTrigger::Complete, actions) {
            actions.push(Action::DisarmTimer);
            actions.push(Action::Resolve(outcome));
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Step,
    Retry,
}

async fn sleep_until(deadline: Option<(Instant, Timer)>) -> Timer {
    match deadline {
        Some((at, timer)) => {
            tokio::time::sleep_until(at).await;
            timer
        }
        None => std::future::pending().await,
    }
}

/// Run `function` to completion on `link`.
///
/// The caller must make sure no other function is in flight on the link,
/// since control bytes carry no correlation id.
pub async fn execute<F: Function>(
    link: &SerialLink,
    function: &F,
    config: &FunctionCallConfig,
    cancel: &CancellationToken,
) -> Result<F::Output> {
    let mut events = link.subscribe();
    let mut transaction = Transaction::new(config.attempts, function.has_return_value());
    let args = function.args();
    let mut timer: Option<(Instant, Timer)> = None;

    tracing::debug!(args = %hex::encode_upper(&args), "Calling {:?}", function.function_id());

    let mut actions = transaction.handle(CallInput::Start);
    loop {
        for action in actions {
            match action {
                Action::Write => link.send_frame(FrameType::Request, &args).await?,
                Action::ArmStepTimer => {
                    timer = Some((Instant::now() + config.network_timeout, Timer::Step));
                }
                Action::ArmRetryTimer => {
                    timer = Some((Instant::now() + config.retry_delay, Timer::Retry));
                }
                Action::DisarmTimer => timer = None,
                Action::Resolve(outcome) => {
                    return finish(function, outcome, transaction.attempt(), config.network_timeout);
                }
            }
        }

        let input = tokio::select! {
            biased;
            _ = cancel.cancelled() => CallInput::Cancel,
            event = events.recv() => match event {
                Ok(LinkEvent::Control(preamble)) => CallInput::Control(preamble),
                Ok(LinkEvent::Unexpected(byte)) => CallInput::Unexpected(byte),
                Ok(LinkEvent::Data(frame)) => {
                    if frame.is_response() && function.is_valid_return_value(frame.payload()) {
                        CallInput::Response(frame.payload_bytes())
                    } else {
                        actions = Vec::new();
                        continue;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Function call lagged, {} link events skipped", skipped);
                    actions = Vec::new();
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
            },
            fired = sleep_until(timer) => {
                timer = None;
                match fired {
                    Timer::Step => CallInput::StepTimeout,
                    Timer::Retry => CallInput::RetryElapsed,
                }
            }
        };

        actions = transaction.handle(input);
    }
}

fn finish<F: Function>(
    function: &F,
    outcome: Outcome,
    attempts: u32,
    network_timeout: Duration,
) -> Result<F::Output> {
    let id = function.function_id();
    match outcome {
        Outcome::Success(payload) => {
            tracing::debug!("{:?} completed", id);
            function.decode_return_value(payload.as_deref().unwrap_or(&[]))
        }
        Outcome::Timeout => Err(ZWaveError::Timeout(format!(
            "{:?} failed after {} attempt(s) with {:?} step timeout",
            id,
            attempts.saturating_sub(1),
            network_timeout
        ))),
        Outcome::Protocol(byte) => Err(ZWaveError::Protocol(format!(
            "unexpected byte {:#04X} while awaiting Ack for {:?}",
            byte, id
        ))),
        Outcome::Cancelled => Err(ZWaveError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::function::FunctionId;
    use crate::protocol::build_data_frame;
    use std::collections::HashMap;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn resolutions(actions: &[Action]) -> Vec<Outcome> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Resolve(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_transition_table_every_pair() {
        use TransmitState::*;
        use TransmitTrigger::*;

        let allowed: HashMap<(TransmitState, TransmitTrigger), TransmitState> = [
            ((Idle, SendCommand), SendingCommand),
            ((SendingCommand, AwaitAck), AwaitingAck),
            ((SendingCommand, Complete), Completed),
            ((AwaitingAck, SendCommand), SendingCommand),
            ((AwaitingAck, RetryAfterDelay), RetryingAfterDelay),
            ((AwaitingAck, AwaitResponse), AwaitingResponse),
            ((AwaitingAck, Complete), Completed),
            ((RetryingAfterDelay, SendCommand), SendingCommand),
            ((AwaitingResponse, SendCommand), SendingCommand),
            ((AwaitingResponse, Complete), Completed),
            ((Idle, Cancel), Cancelled),
            ((SendingCommand, Cancel), Cancelled),
            ((AwaitingAck, Cancel), Cancelled),
            ((AwaitingResponse, Cancel), Cancelled),
            ((RetryingAfterDelay, Cancel), Cancelled),
        ]
        .into_iter()
        .collect();

        for state in TransmitState::ALL {
            for trigger in TransmitTrigger::ALL {
                assert_eq!(
                    state.next(trigger),
                    allowed.get(&(state, trigger)).copied(),
                    "{:?} + {:?}",
                    state,
                    trigger
                );
            }
        }
    }

    #[test]
    fn test_start_writes_and_awaits_ack() {
        let mut tx = Transaction::new(3, true);
        let actions = tx.handle(CallInput::Start);

        assert_eq!(actions, vec![Action::Write, Action::ArmStepTimer]);
        assert_eq!(tx.state(), TransmitState::AwaitingAck);
        assert_eq!(tx.attempt(), 1);
    }

    #[test]
    fn test_nack_ack_response_resolves_once() {
        let mut tx = Transaction::new(3, true);
        tx.handle(CallInput::Start);

        let actions = tx.handle(CallInput::Control(Preamble::Nack));
        assert_eq!(actions, vec![Action::Write, Action::ArmStepTimer]);
        assert_eq!(tx.attempt(), 2);

        let actions = tx.handle(CallInput::Control(Preamble::Ack));
        assert_eq!(actions, vec![Action::ArmStepTimer]);
        assert_eq!(tx.state(), TransmitState::AwaitingResponse);

        let payload = Bytes::from_static(&[0x20, 0x01]);
        let actions = tx.handle(CallInput::Response(payload.clone()));
        assert_eq!(resolutions(&actions), vec![Outcome::Success(Some(payload))]);
        assert_eq!(tx.state(), TransmitState::Completed);

        // Late inputs are ignored.
        assert!(tx.handle(CallInput::Response(Bytes::new())).is_empty());
        assert!(tx.handle(CallInput::StepTimeout).is_empty());
        assert!(tx.handle(CallInput::Cancel).is_empty());
    }

    #[test]
    fn test_ack_only_function_completes_on_ack() {
        let mut tx = Transaction::new(3, false);
        tx.handle(CallInput::Start);

        let actions = tx.handle(CallInput::Control(Preamble::Ack));
        assert_eq!(resolutions(&actions), vec![Outcome::Success(None)]);
    }

    #[test]
    fn test_ack_and_timeout_together_resolve_once() {
        let mut tx = Transaction::new(3, false);
        tx.handle(CallInput::Start);

        let mut all = tx.handle(CallInput::Control(Preamble::Ack));
        all.extend(tx.handle(CallInput::StepTimeout));
        assert_eq!(resolutions(&all).len(), 1);

        // And the other order: the timeout resends, then the Ack completes.
        let mut tx = Transaction::new(3, false);
        tx.handle(CallInput::Start);
        let mut all = tx.handle(CallInput::StepTimeout);
        all.extend(tx.handle(CallInput::Control(Preamble::Ack)));
        all.extend(tx.handle(CallInput::Control(Preamble::Ack)));
        assert_eq!(resolutions(&all), vec![Outcome::Success(None)]);
    }

    #[test]
    fn test_attempts_exhausted_stops_writing() {
        let mut tx = Transaction::new(3, true);
        let mut writes = tx
            .handle(CallInput::Start)
            .iter()
            .filter(|a| **a == Action::Write)
            .count();

        let mut outcomes = Vec::new();
        for _ in 0..5 {
            let actions = tx.handle(CallInput::StepTimeout);
            writes += actions.iter().filter(|a| **a == Action::Write).count();
            outcomes.extend(resolutions(&actions));
        }

        assert_eq!(writes, 3);
        assert_eq!(outcomes, vec![Outcome::Timeout]);
        assert_eq!(tx.state(), TransmitState::Completed);
    }

    #[test]
    fn test_cancel_byte_waits_then_resends() {
        let mut tx = Transaction::new(3, true);
        tx.handle(CallInput::Start);

        let actions = tx.handle(CallInput::Control(Preamble::Cancel));
        assert_eq!(actions, vec![Action::ArmRetryTimer]);
        assert_eq!(tx.state(), TransmitState::RetryingAfterDelay);

        // A step timeout does not apply while waiting to retry.
        assert!(tx.handle(CallInput::StepTimeout).is_empty());

        let actions = tx.handle(CallInput::RetryElapsed);
        assert_eq!(actions, vec![Action::Write, Action::ArmStepTimer]);
        assert_eq!(tx.attempt(), 2);
    }

    #[test]
    fn test_unexpected_byte_is_protocol_error() {
        let mut tx = Transaction::new(3, true);
        tx.handle(CallInput::Start);

        let actions = tx.handle(CallInput::Unexpected(0x42));
        assert_eq!(resolutions(&actions), vec![Outcome::Protocol(0x42)]);
    }

    #[test]
    fn test_control_outside_ack_wait_ignored() {
        let mut tx = Transaction::new(3, true);
        tx.handle(CallInput::Start);
        tx.handle(CallInput::Control(Preamble::Ack));

        assert!(tx.handle(CallInput::Control(Preamble::Nack)).is_empty());
        assert!(tx.handle(CallInput::Unexpected(0x00)).is_empty());
        assert_eq!(tx.state(), TransmitState::AwaitingResponse);
    }

    #[test]
    fn test_cancel_resolves_cancelled() {
        let mut tx = Transaction::new(3, true);
        tx.handle(CallInput::Start);

        let actions = tx.handle(CallInput::Cancel);
        assert_eq!(resolutions(&actions), vec![Outcome::Cancelled]);
        assert!(tx.handle(CallInput::Control(Preamble::Ack)).is_empty());
    }

    struct MemoryIdCall;

    impl Function for MemoryIdCall {
        type Output = Vec<u8>;

        fn function_id(&self) -> FunctionId {
            FunctionId::MemoryGetId
        }

        fn args(&self) -> Bytes {
            Bytes::from_static(&[0x20])
        }

        fn decode_return_value(&self, payload: &[u8]) -> Result<Vec<u8>> {
            Ok(payload.to_vec())
        }
    }

    fn fast_config() -> FunctionCallConfig {
        FunctionCallConfig {
            attempts: 3,
            network_timeout: Duration::from_millis(40),
            retry_delay: Duration::from_millis(60),
        }
    }

    /// Next data frame payload written by the host, skipping Acks.
    async fn next_request(stream: &mut DuplexStream) -> Vec<u8> {
        loop {
            let byte = stream.read_u8().await.unwrap();
            if byte != 0x01 {
                continue;
            }
            let len = stream.read_u8().await.unwrap() as usize;
            let mut rest = vec![0u8; len];
            stream.read_exact(&mut rest).await.unwrap();
            return rest[1..len - 1].to_vec();
        }
    }

    #[tokio::test]
    async fn test_execute_nack_then_response() {
        let (host, mut controller) = duplex(1024);
        let link = SerialLink::spawn(host, &LinkConfig::default());

        let script = tokio::spawn(async move {
            assert_eq!(next_request(&mut controller).await, vec![0x20]);
            controller.write_all(&[0x15]).await.unwrap();
            assert_eq!(next_request(&mut controller).await, vec![0x20]);
            controller.write_all(&[0x06]).await.unwrap();
            controller
                .write_all(&build_data_frame(
                    FrameType::Response,
                    &[0x20, 0xC0, 0xFF, 0xEE, 0x01, 0x01],
                ).unwrap())
                .await
                .unwrap();
            controller
        });

        let out = execute(&link, &MemoryIdCall, &fast_config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, vec![0x20, 0xC0, 0xFF, 0xEE, 0x01, 0x01]);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_no_ack_fails_after_attempts() {
        let (host, mut controller) = duplex(1024);
        let link = SerialLink::spawn(host, &LinkConfig::default());

        let counter = tokio::spawn(async move {
            let mut seen = 0;
            while tokio::time::timeout(Duration::from_millis(300), next_request(&mut controller))
                .await
                .is_ok()
            {
                seen += 1;
            }
            seen
        });

        let err = execute(&link, &MemoryIdCall, &fast_config(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(counter.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_execute_retries_after_cancel_byte() {
        let (host, mut controller) = duplex(1024);
        let link = SerialLink::spawn(host, &LinkConfig::default());

        let script = tokio::spawn(async move {
            next_request(&mut controller).await;
            let cancelled_at = Instant::now();
            controller.write_all(&[0x18]).await.unwrap();
            next_request(&mut controller).await;
            let waited = cancelled_at.elapsed();
            controller.write_all(&[0x06]).await.unwrap();
            controller
                .write_all(&build_data_frame(FrameType::Response, &[0x20, 0x01]).unwrap())
                .await
                .unwrap();
            (waited, controller)
        });

        execute(&link, &MemoryIdCall, &fast_config(), &CancellationToken::new())
            .await
            .unwrap();
        let (waited, _controller) = script.await.unwrap();
        assert!(waited >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_execute_ignores_foreign_responses() {
        let (host, mut controller) = duplex(1024);
        let link = SerialLink::spawn(host, &LinkConfig::default());

        let script = tokio::spawn(async move {
            next_request(&mut controller).await;
            controller.write_all(&[0x06]).await.unwrap();
            controller
                .write_all(&build_data_frame(FrameType::Response, &[0x56, 0x01]).unwrap())
                .await
                .unwrap();
            controller
                .write_all(&build_data_frame(FrameType::Request, &[0x20, 0x09]).unwrap())
                .await
                .unwrap();
            controller
                .write_all(&build_data_frame(FrameType::Response, &[0x20, 0x02]).unwrap())
                .await
                .unwrap();
            controller
        });

        let out = execute(&link, &MemoryIdCall, &fast_config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, vec![0x20, 0x02]);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_cancelled_by_token() {
        let (host, _controller) = duplex(1024);
        let link = SerialLink::spawn(host, &LinkConfig::default());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let config = FunctionCallConfig {
            network_timeout: Duration::from_secs(5),
            ..fast_config()
        };
        let err = execute(&link, &MemoryIdCall, &config, &cancel).await.unwrap_err();
        assert!(matches!(err, ZWaveError::Cancelled));
    }
}
