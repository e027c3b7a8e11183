//! Client builder and the upward API.
//!
//! The [`ZWaveClientBuilder`] provides a fluent API for configuring timeouts
//! and extra command-class codecs. The [`ZWaveClient`] manages the lifecycle:
//! 1. Start the serial link (reader and writer tasks)
//! 2. Start the dispatcher task that routes unsolicited Requests
//! 3. Run controller functions one at a time through the function gate
//! 4. Correlate Gets with Reports and publish everything else as events
//!
//! # Example
//!
//! ```ignore
//! use zwave_serial::command_class::multilevel_sensor::{SensorType, TemperatureScale};
//! use zwave_serial::ZWaveClient;
//!
//! #[tokio::main]
//! async fn main() -> zwave_serial::Result<()> {
//!     let client = ZWaveClient::builder()
//!         .attempts(3)
//!         .report_timeout(std::time::Duration::from_secs(5))
//!         .open_serial()?;
//!
//!     client.basic_set(2, 0xFF).await?;
//!     let report = client
//!         .multilevel_sensor_get(3, SensorType::AirTemperature, TemperatureScale::Celsius as u8)
//!         .await?;
//!     println!("{:?}", report);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command_class::basic::{self, BasicReport};
use crate::command_class::battery::{self, BatteryReport};
use crate::command_class::color_switch::{self, ColorComponent};
use crate::command_class::configuration::{self, ConfigurationReport};
use crate::command_class::manufacturer_specific::{self, ManufacturerSpecificReport};
use crate::command_class::multilevel_sensor::{self, MultilevelSensorReport, SensorType};
use crate::command_class::multilevel_switch::{self, MultilevelSwitchReport};
use crate::command_class::notification::{self, NotificationReport, NotificationType};
use crate::command_class::wake_up::{self, WakeUpReport};
use crate::command_class::zwave_plus_info::{self, ZWavePlusInfoReport};
use crate::command_class::{
    CommandClassCodec, CommandClassDispatcher, GetRequest, NodeReport, Report, WakeUpReceiver,
};
use crate::config::ClientConfig;
use crate::error::{Result, ZWaveError};
use crate::function::{
    execute, ApplicationCommand, ApplicationUpdate, CallbackIdGenerator, Function, FunctionId,
    GetNodeProtocolInfo, GetSucNodeId, InitData, LibraryType, MemoryGetId, MemoryId, NodeInfo,
    NodeProtocolInfo, RequestNodeInfo, SendData, SendDataAbort, SendDataCallback,
    SerialApiGetInitData, SerialApiSetup, SetupSubcommand, TransmitOptions, TypeLibrary,
    UpdateStatus,
};
use crate::inclusion::{self, AddDeviceOptions, InclusionResult, RemovalResult, RemoveDeviceOptions};
use crate::link::{next_frame, LinkEvent, SerialLink};
use crate::protocol::DataFrame;
use crate::NodeId;

/// Builder for configuring and creating a [`ZWaveClient`].
pub struct ZWaveClientBuilder {
    config: ClientConfig,
    codecs: Vec<Box<dyn CommandClassCodec>>,
}

impl ZWaveClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            codecs: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Transmissions per controller function before giving up.
    ///
    /// Default: 3
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.config.function_call.attempts = attempts;
        self
    }

    /// Wait for each Ack and Response.
    ///
    /// Default: 1 second
    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.config.function_call.network_timeout = timeout;
        self
    }

    /// Delay before resending after a Cancel byte.
    ///
    /// Default: 1 second
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.function_call.retry_delay = delay;
        self
    }

    /// Wait for the Report answering a Get.
    ///
    /// Default: 10 seconds
    pub fn report_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_class.report_timeout = timeout;
        self
    }

    /// Wait for the SendData transmit-complete callback.
    ///
    /// Default: 65 seconds
    pub fn transmit_callback_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_class.transmit_callback_timeout = timeout;
        self
    }

    /// Register an extra command-class codec, replacing a built-in one for
    /// the same class.
    pub fn codec<C: CommandClassCodec>(mut self, codec: C) -> Self {
        self.codecs.push(Box::new(codec));
        self
    }

    /// Start the client over a bidirectional stream.
    pub fn connect<S>(self, stream: S) -> ZWaveClient
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let link = SerialLink::spawn(stream, &self.config.link);
        self.start(link)
    }

    /// Start the client over separate read and write halves.
    pub fn connect_split<R, W>(self, reader: R, writer: W) -> ZWaveClient
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let link = SerialLink::spawn_split(reader, writer, &self.config.link);
        self.start(link)
    }

    /// Open the serial port named in the configuration and start the client.
    #[cfg(feature = "serial")]
    pub fn open_serial(self) -> Result<ZWaveClient> {
        let port = crate::transport::open_serial(&self.config.serial)?;
        Ok(self.connect(port))
    }

    fn start(self, link: SerialLink) -> ZWaveClient {
        let mut dispatcher = CommandClassDispatcher::new(self.config.command_class.event_capacity);
        for codec in self.codecs {
            dispatcher.register_boxed(codec);
        }
        let dispatcher = Arc::new(dispatcher);
        let (node_info, _) = broadcast::channel(self.config.command_class.event_capacity.max(1));

        let dispatch_task = tokio::spawn(dispatch_loop(
            link.subscribe(),
            dispatcher.clone(),
            node_info.clone(),
            link.closed_token(),
        ));

        ZWaveClient {
            inner: Arc::new(ClientInner {
                link,
                config: self.config,
                dispatcher,
                callback_ids: CallbackIdGenerator::new(),
                function_gate: Mutex::new(()),
                inclusion_gate: Mutex::new(()),
                node_info,
                dispatch_task: StdMutex::new(Some(dispatch_task)),
            }),
        }
    }
}

impl Default for ZWaveClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every clone of a client and by the inclusion sequences.
pub(crate) struct ClientInner {
    pub(crate) link: SerialLink,
    pub(crate) config: ClientConfig,
    pub(crate) dispatcher: Arc<CommandClassDispatcher>,
    pub(crate) callback_ids: CallbackIdGenerator,
    /// At most one controller function in flight.
    function_gate: Mutex<()>,
    inclusion_gate: Mutex<()>,
    node_info: broadcast::Sender<ApplicationUpdate>,
    dispatch_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
    /// Run one controller function once the link is free.
    pub(crate) async fn call<F: Function>(&self, function: &F, cancel: &CancellationToken) -> Result<F::Output> {
        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ZWaveError::Cancelled),
            guard = self.function_gate.lock() => guard,
        };
        execute(&self.link, function, &self.config.function_call, cancel).await
    }

    /// SendData, then wait for its transmit-complete callback.
    pub(crate) async fn send_command_class(
        &self,
        node_id: NodeId,
        payload: impl Into<Bytes>,
        options: TransmitOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let callback_id = self.callback_ids.next_id();
        let function = SendData::new(node_id, payload, options, callback_id)?;
        tracing::trace!(payload = %hex::encode_upper(&function.payload), "SendData to node {}", node_id);

        // Subscribe first so a fast callback is not missed.
        let mut events = self.link.subscribe();
        self.call(&function, cancel).await?;

        let timeout = self.config.command_class.transmit_callback_timeout;
        let callback = next_frame(&mut events, |frame| {
            if !frame.is_request() {
                return None;
            }
            SendDataCallback::parse(frame.payload()).filter(|cb| cb.callback_id == callback_id)
        });
        let callback = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ZWaveError::Cancelled),
            result = tokio::time::timeout(timeout, callback) => result,
        };

        match callback {
            Ok(Ok(cb)) if cb.status.is_delivered() => {
                tracing::debug!("Node {} acknowledged callback {}", node_id, callback_id);
                Ok(())
            }
            Ok(Ok(cb)) => {
                tracing::debug!("SendData to node {} failed: {:?}", node_id, cb.status);
                Err(ZWaveError::Transmit(cb.status))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!("No transmit callback {} for node {}, aborting", callback_id, node_id);
                if let Err(e) = self.call(&SendDataAbort, &CancellationToken::new()).await {
                    tracing::warn!("SendDataAbort failed: {}", e);
                }
                Err(ZWaveError::Timeout(format!(
                    "no transmit callback from node {} within {:?}",
                    node_id, timeout
                )))
            }
        }
    }

    /// Send a Get and wait for the Report that answers it.
    pub(crate) async fn get_response(
        &self,
        node_id: NodeId,
        request: &GetRequest,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let pending = self.dispatcher.register_get(node_id, request)?;
        self.send_command_class(node_id, request.bytes.clone(), TransmitOptions::default(), cancel)
            .await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ZWaveError::Cancelled),
            report = pending.wait(self.config.command_class.report_timeout) => report,
        }
    }
}

/// Routes unsolicited controller Requests until the link closes.
async fn dispatch_loop(
    mut events: broadcast::Receiver<LinkEvent>,
    dispatcher: Arc<CommandClassDispatcher>,
    node_info: broadcast::Sender<ApplicationUpdate>,
    closed: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(LinkEvent::Data(frame)) if frame.is_request() => {
                if let Err(e) = dispatch_request(&frame, &dispatcher, &node_info) {
                    tracing::warn!(payload = %hex::encode_upper(frame.payload()), "Dropped inbound request: {}", e);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dispatcher lagged, {} link events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Dispatcher stopped");
}

fn dispatch_request(
    frame: &DataFrame,
    dispatcher: &CommandClassDispatcher,
    node_info: &broadcast::Sender<ApplicationUpdate>,
) -> Result<()> {
    match frame.function_id().and_then(FunctionId::from_byte) {
        Some(FunctionId::ApplicationCommandHandler | FunctionId::ApplicationCommandHandlerBridge) => {
            let command = ApplicationCommand::parse(frame.payload())?;
            let report = dispatcher.dispatch(command.source, &command.payload)?;
            tracing::debug!("Node {} sent {:?}", command.source, report);
        }
        Some(FunctionId::ApplicationUpdate) => {
            let update = ApplicationUpdate::parse(frame.payload())?;
            tracing::debug!("Application update from node {}: {:?}", update.node_id, update.status);
            let _ = node_info.send(update);
        }
        // Callbacks are consumed by whoever is waiting for them.
        _ => {}
    }
    Ok(())
}

/// A running Z-Wave client. Cheap to clone; clones share one link.
#[derive(Clone)]
pub struct ZWaveClient {
    inner: Arc<ClientInner>,
}

impl ZWaveClient {
    pub fn builder() -> ZWaveClientBuilder {
        ZWaveClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.link.is_closed()
    }

    // ---- command classes ----

    /// Send command-class bytes to a node with the default transmit options.
    ///
    /// Succeeds once the controller reports delivery.
    pub async fn send_command_class(&self, node_id: NodeId, payload: impl Into<Bytes>) -> Result<()> {
        self.inner
            .send_command_class(node_id, payload, TransmitOptions::default(), &CancellationToken::new())
            .await
    }

    pub async fn send_command_class_with(
        &self,
        node_id: NodeId,
        payload: impl Into<Bytes>,
        options: TransmitOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.inner.send_command_class(node_id, payload, options, cancel).await
    }

    /// Send a Get and wait for the Report that answers it.
    pub async fn get_response(&self, node_id: NodeId, request: GetRequest) -> Result<Report> {
        self.inner
            .get_response(node_id, &request, &CancellationToken::new())
            .await
    }

    pub async fn get_response_with(
        &self,
        node_id: NodeId,
        request: GetRequest,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        self.inner.get_response(node_id, &request, cancel).await
    }

    async fn get_typed<T>(
        &self,
        node_id: NodeId,
        request: GetRequest,
        extract: impl FnOnce(Report) -> std::result::Result<T, Report>,
    ) -> Result<T> {
        let report = self.get_response(node_id, request).await?;
        extract(report).map_err(|report| {
            ZWaveError::Protocol(format!(
                "node {} answered with unexpected report {:#04X}/{:#04X}",
                node_id,
                report.class_id(),
                report.command()
            ))
        })
    }

    pub async fn basic_set(&self, node_id: NodeId, value: u8) -> Result<()> {
        self.send_command_class(node_id, basic::set(value)).await
    }

    pub async fn basic_get(&self, node_id: NodeId) -> Result<BasicReport> {
        self.get_typed(node_id, basic::get(), |report| match report {
            Report::Basic(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    /// Set a dimmer level (0..=99, or 0xFF for the last level).
    pub async fn multilevel_switch_set(&self, node_id: NodeId, level: u8, duration: u8) -> Result<()> {
        self.send_command_class(node_id, multilevel_switch::set(level, duration)?)
            .await
    }

    pub async fn multilevel_switch_get(&self, node_id: NodeId) -> Result<MultilevelSwitchReport> {
        self.get_typed(node_id, multilevel_switch::get(), |report| match report {
            Report::MultilevelSwitch(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn multilevel_sensor_get(
        &self,
        node_id: NodeId,
        sensor_type: SensorType,
        scale: u8,
    ) -> Result<MultilevelSensorReport> {
        self.get_typed(node_id, multilevel_sensor::get(sensor_type, scale), |report| match report {
            Report::MultilevelSensor(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn color_switch_set(
        &self,
        node_id: NodeId,
        components: &[(ColorComponent, u8)],
        duration: u8,
    ) -> Result<()> {
        self.send_command_class(node_id, color_switch::set(components, duration)?)
            .await
    }

    pub async fn configuration_set(&self, node_id: NodeId, parameter: u8, size: u8, value: i32) -> Result<()> {
        self.send_command_class(node_id, configuration::set(parameter, size, value, false)?)
            .await
    }

    /// Revert a parameter to its factory default.
    pub async fn configuration_restore_default(&self, node_id: NodeId, parameter: u8) -> Result<()> {
        self.send_command_class(node_id, configuration::set(parameter, 1, 0, true)?)
            .await
    }

    pub async fn configuration_get(&self, node_id: NodeId, parameter: u8) -> Result<ConfigurationReport> {
        self.get_typed(node_id, configuration::get(parameter), |report| match report {
            Report::Configuration(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn notification_get(
        &self,
        node_id: NodeId,
        notification_type: NotificationType,
    ) -> Result<NotificationReport> {
        self.get_typed(node_id, notification::get(notification_type), |report| match report {
            Report::Notification(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn manufacturer_specific_get(&self, node_id: NodeId) -> Result<ManufacturerSpecificReport> {
        self.get_typed(node_id, manufacturer_specific::get(), |report| match report {
            Report::ManufacturerSpecific(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn battery_get(&self, node_id: NodeId) -> Result<BatteryReport> {
        self.get_typed(node_id, battery::get(), |report| match report {
            Report::Battery(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    /// Set how often a sleeping node wakes up and which node it notifies.
    pub async fn wake_up_interval_set(&self, node_id: NodeId, seconds: u32, notify: NodeId) -> Result<()> {
        self.send_command_class(node_id, wake_up::interval_set(seconds, notify)?)
            .await
    }

    pub async fn wake_up_interval_get(&self, node_id: NodeId) -> Result<WakeUpReport> {
        self.get_typed(node_id, wake_up::interval_get(), |report| match report {
            Report::WakeUp(r @ WakeUpReport::Interval { .. }) => Ok(r),
            other => Err(other),
        })
        .await
    }

    pub async fn wake_up_interval_capabilities_get(&self, node_id: NodeId) -> Result<WakeUpReport> {
        self.get_typed(node_id, wake_up::interval_capabilities_get(), |report| match report {
            Report::WakeUp(r @ WakeUpReport::IntervalCapabilities { .. }) => Ok(r),
            other => Err(other),
        })
        .await
    }

    /// Let a woken node go back to sleep.
    pub async fn wake_up_no_more_information(&self, node_id: NodeId) -> Result<()> {
        self.inner
            .send_command_class(
                node_id,
                wake_up::no_more_information(),
                TransmitOptions::ACK,
                &CancellationToken::new(),
            )
            .await
    }

    pub async fn zwave_plus_info_get(&self, node_id: NodeId) -> Result<ZWavePlusInfoReport> {
        self.get_typed(node_id, zwave_plus_info::get(), |report| match report {
            Report::ZWavePlusInfo(r) => Ok(r),
            other => Err(other),
        })
        .await
    }

    // ---- inclusion ----

    /// Put the controller in learn mode and add the next node that joins.
    ///
    /// Only one add or remove may run at a time; a concurrent attempt fails
    /// with [`ZWaveError::InclusionInProgress`].
    pub async fn add_device(&self, options: AddDeviceOptions) -> Result<InclusionResult> {
        let _gate = self
            .inner
            .inclusion_gate
            .try_lock()
            .map_err(|_| ZWaveError::InclusionInProgress)?;
        inclusion::add_node(&self.inner, options).await
    }

    /// Put the controller in learn mode and remove the next node that leaves.
    pub async fn remove_device(&self, options: RemoveDeviceOptions) -> Result<RemovalResult> {
        let _gate = self
            .inner
            .inclusion_gate
            .try_lock()
            .map_err(|_| ZWaveError::InclusionInProgress)?;
        inclusion::remove_node(&self.inner, options).await
    }

    // ---- controller functions ----

    pub async fn memory_get_id(&self) -> Result<MemoryId> {
        self.inner.call(&MemoryGetId, &CancellationToken::new()).await
    }

    /// SUC node id, 0 when the network has none.
    pub async fn get_suc_node_id(&self) -> Result<NodeId> {
        self.inner.call(&GetSucNodeId, &CancellationToken::new()).await
    }

    pub async fn serial_api_get_init_data(&self) -> Result<InitData> {
        self.inner.call(&SerialApiGetInitData, &CancellationToken::new()).await
    }

    pub async fn serial_api_setup(&self, subcommand: SetupSubcommand, args: impl Into<Vec<u8>>) -> Result<Bytes> {
        self.inner
            .call(&SerialApiSetup::new(subcommand, args), &CancellationToken::new())
            .await
    }

    pub async fn type_library(&self) -> Result<LibraryType> {
        self.inner.call(&TypeLibrary, &CancellationToken::new()).await
    }

    pub async fn get_node_protocol_info(&self, node_id: NodeId) -> Result<NodeProtocolInfo> {
        self.inner
            .call(&GetNodeProtocolInfo { node_id }, &CancellationToken::new())
            .await
    }

    /// Ask a node for its node information frame and wait for it.
    pub async fn request_node_info(&self, node_id: NodeId) -> Result<NodeInfo> {
        let mut updates = self.inner.node_info.subscribe();
        self.inner
            .call(&RequestNodeInfo { node_id }, &CancellationToken::new())
            .await?;

        let timeout = self.inner.config.command_class.report_timeout;
        let wait = async {
            loop {
                match updates.recv().await {
                    Ok(update) if update.node_id == node_id || update.status == UpdateStatus::NodeInfoRequestFailed => {
                        return Ok(update);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Node info subscriber lagged, {} updates skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
                }
            }
        };
        let update = tokio::time::timeout(timeout, wait).await.map_err(|_| {
            ZWaveError::Timeout(format!("no node information from node {} within {:?}", node_id, timeout))
        })??;

        update
            .info
            .ok_or_else(|| ZWaveError::Protocol(format!("node information request for node {} failed", node_id)))
    }

    pub async fn send_data_abort(&self) -> Result<()> {
        self.inner.call(&SendDataAbort, &CancellationToken::new()).await
    }

    // ---- events ----

    /// Every decoded command-class report, solicited or not.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<NodeReport> {
        self.inner.dispatcher.subscribe_reports()
    }

    /// Wake-up notifications from one node.
    pub fn subscribe_wake_ups(&self, node_id: NodeId) -> WakeUpReceiver {
        self.inner.dispatcher.subscribe_wake_ups(node_id)
    }

    pub fn subscribe_node_info(&self) -> broadcast::Receiver<ApplicationUpdate> {
        self.inner.node_info.subscribe()
    }

    /// Stop the link and the dispatcher. Other clones see a closed client.
    pub async fn shutdown(self) {
        let task = self
            .inner
            .dispatch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.link.closed_token().cancel();
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            inner.link.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::TransmitStatus;
    use crate::protocol::{build_data_frame, FrameType};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn fast_client() -> (ZWaveClient, DuplexStream) {
        let (host, controller) = duplex(4096);
        let client = ZWaveClient::builder()
            .network_timeout(Duration::from_millis(100))
            .retry_delay(Duration::from_millis(50))
            .report_timeout(Duration::from_millis(300))
            .transmit_callback_timeout(Duration::from_millis(300))
            .connect(host);
        (client, controller)
    }

    /// Next data frame payload written by the host, skipping Acks.
    async fn next_request(stream: &mut DuplexStream) -> Vec<u8> {
        loop {
            if stream.read_u8().await.unwrap() != 0x01 {
                continue;
            }
            let len = stream.read_u8().await.unwrap() as usize;
            let mut rest = vec![0u8; len];
            stream.read_exact(&mut rest).await.unwrap();
            return rest[1..len - 1].to_vec();
        }
    }

    async fn send(stream: &mut DuplexStream, frame_type: FrameType, payload: &[u8]) {
        stream.write_all(&build_data_frame(frame_type, payload).unwrap()).await.unwrap();
    }

    #[test]
    fn test_builder_configuration() {
        let builder = ZWaveClient::builder()
            .attempts(5)
            .network_timeout(Duration::from_millis(250))
            .retry_delay(Duration::from_millis(20))
            .report_timeout(Duration::from_secs(2))
            .transmit_callback_timeout(Duration::from_secs(3));

        assert_eq!(builder.config.function_call.attempts, 5);
        assert_eq!(builder.config.function_call.network_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.function_call.retry_delay, Duration::from_millis(20));
        assert_eq!(builder.config.command_class.report_timeout, Duration::from_secs(2));
        assert_eq!(
            builder.config.command_class.transmit_callback_timeout,
            Duration::from_secs(3)
        );
    }

    #[tokio::test]
    async fn test_send_command_class_waits_for_callback() {
        let (client, mut controller) = fast_client();

        let script = tokio::spawn(async move {
            let request = next_request(&mut controller).await;
            assert_eq!(&request[..5], &[0x13, 0x02, 0x02, 0x20, 0x01]);
            let callback_id = request[request.len() - 1];
            controller.write_all(&[0x06]).await.unwrap();
            send(&mut controller, FrameType::Response, &[0x13, 0x01]).await;
            send(&mut controller, FrameType::Request, &[0x13, callback_id, 0x00]).await;
            controller
        });

        client.send_command_class(2, vec![0x20, 0x01]).await.unwrap();
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_transmit_failure_surfaces_status() {
        let (client, mut controller) = fast_client();

        let script = tokio::spawn(async move {
            let request = next_request(&mut controller).await;
            let callback_id = request[request.len() - 1];
            controller.write_all(&[0x06]).await.unwrap();
            send(&mut controller, FrameType::Response, &[0x13, 0x01]).await;
            // A callback for someone else first.
            send(&mut controller, FrameType::Request, &[0x13, callback_id.wrapping_add(1), 0x00]).await;
            send(&mut controller, FrameType::Request, &[0x13, callback_id, 0x01]).await;
            controller
        });

        let err = client.basic_set(2, 0xFF).await.unwrap_err();
        assert!(matches!(err, ZWaveError::Transmit(TransmitStatus::NoAck)));
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_callback_times_out_and_aborts() {
        let (client, mut controller) = fast_client();

        let script = tokio::spawn(async move {
            next_request(&mut controller).await;
            controller.write_all(&[0x06]).await.unwrap();
            send(&mut controller, FrameType::Response, &[0x13, 0x01]).await;

            let abort = next_request(&mut controller).await;
            controller.write_all(&[0x06]).await.unwrap();
            abort
        });

        let err = client.basic_set(2, 0x00).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(script.await.unwrap(), vec![0x16]);
    }

    #[tokio::test]
    async fn test_unsolicited_report_published() {
        let (client, mut controller) = fast_client();
        let mut reports = client.subscribe_reports();

        send(&mut controller, FrameType::Request, &[0x04, 0x00, 0x05, 0x03, 0x20, 0x03, 0x10]).await;

        let report = tokio::time::timeout(Duration::from_secs(1), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.node_id, 5);
        assert_eq!(report.report, Report::Basic(BasicReport { value: 0x10 }));
    }

    #[tokio::test]
    async fn test_request_node_info() {
        let (client, mut controller) = fast_client();

        let script = tokio::spawn(async move {
            assert_eq!(next_request(&mut controller).await, vec![0x60, 0x07]);
            controller.write_all(&[0x06]).await.unwrap();
            send(&mut controller, FrameType::Response, &[0x60, 0x01]).await;
            send(
                &mut controller,
                FrameType::Request,
                &[0x49, 0x84, 0x07, 0x05, 0x04, 0x10, 0x01, 0x25, 0x86],
            )
            .await;
            controller
        });

        let info = client.request_node_info(7).await.unwrap();
        assert_eq!(info.node_id, 7);
        assert_eq!(info.generic, 0x10);
        assert_eq!(info.command_classes, vec![0x25, 0x86]);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_link() {
        let (client, _controller) = fast_client();
        let other = client.clone();

        client.shutdown().await;
        assert!(other.is_closed());
        assert!(matches!(
            other.basic_set(2, 0x01).await,
            Err(ZWaveError::ConnectionClosed)
        ));
    }
}
