//! Inbound command-class dispatch and Get/Report correlation.
//!
//! The dispatcher owns a registry of codecs keyed by class id, the table of
//! outstanding Gets, and the broadcast feeds for reports and wake-ups.
//!
//! # Correlation
//!
//! Each Get gets a fresh request id. An inbound Report resolves the oldest
//! pending Get whose node, class, report command and filter all match.
//! A second Get with the same key while one is pending is rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use super::basic::BasicCodec;
use super::battery::BatteryCodec;
use super::configuration::ConfigurationCodec;
use super::crc16;
use super::manufacturer_specific::ManufacturerSpecificCodec;
use super::multilevel_sensor::MultilevelSensorCodec;
use super::multilevel_switch::MultilevelSwitchCodec;
use super::notification::NotificationCodec;
use super::wake_up::{WakeUpCodec, WakeUpReport};
use super::zwave_plus_info::ZWavePlusInfoCodec;
use super::{CommandClassCodec, CommandClassId, GetRequest, Report, ReportFilter};
use crate::error::{Result, ZWaveError};
use crate::NodeId;

/// A decoded report and the node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub node_id: NodeId,
    pub report: Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingKey {
    node_id: NodeId,
    class_id: u8,
    report_command: u8,
    filter: ReportFilter,
}

impl PendingKey {
    fn matches(&self, node_id: NodeId, report: &Report) -> bool {
        self.node_id == node_id
            && self.class_id == report.class_id()
            && self.report_command == report.command()
            && self.filter.accepts(report)
    }
}

struct PendingEntry {
    key: PendingKey,
    tx: oneshot::Sender<Report>,
}

#[derive(Default)]
struct PendingTable {
    entries: BTreeMap<u64, PendingEntry>,
}

impl PendingTable {
    fn insert(&mut self, request_id: u64, key: PendingKey, tx: oneshot::Sender<Report>) -> Result<()> {
        if self.entries.values().any(|entry| entry.key == key) {
            return Err(ZWaveError::CorrelationInUse {
                node_id: key.node_id,
                class_id: key.class_id,
                command: key.report_command,
            });
        }
        self.entries.insert(request_id, PendingEntry { key, tx });
        Ok(())
    }

    /// Hand `report` to the oldest matching entry.
    fn resolve(&mut self, node_id: NodeId, report: &Report) -> Option<u64> {
        let request_id = self
            .entries
            .iter()
            .find(|(_, entry)| entry.key.matches(node_id, report))
            .map(|(id, _)| *id)?;
        let entry = self.entries.remove(&request_id)?;
        // The waiter may have just given up; nothing to do then.
        let _ = entry.tx.send(report.clone());
        Some(request_id)
    }

    fn remove(&mut self, request_id: u64) {
        self.entries.remove(&request_id);
    }
}

type SharedTable = Arc<Mutex<PendingTable>>;

fn lock(table: &SharedTable) -> std::sync::MutexGuard<'_, PendingTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An outstanding Get. Dropping it withdraws the Get.
pub struct PendingReport {
    request_id: u64,
    rx: oneshot::Receiver<Report>,
    table: SharedTable,
}

impl PendingReport {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the matching Report.
    pub async fn wait(mut self, timeout: Duration) -> Result<Report> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(_)) => Err(ZWaveError::Cancelled),
            Err(_) => Err(ZWaveError::Timeout(format!(
                "no report for request {} within {:?}",
                self.request_id, timeout
            ))),
        }
    }
}

impl Drop for PendingReport {
    fn drop(&mut self) {
        lock(&self.table).remove(self.request_id);
    }
}

/// Wake-up notifications for one node.
pub struct WakeUpReceiver {
    node_id: NodeId,
    rx: broadcast::Receiver<NodeId>,
}

impl WakeUpReceiver {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Wait for the node's next wake-up.
    pub async fn recv(&mut self) -> Result<()> {
        loop {
            match self.rx.recv().await {
                Ok(node_id) if node_id == self.node_id => return Ok(()),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Wake-up subscriber lagged, {} notifications skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ZWaveError::ConnectionClosed),
            }
        }
    }
}

/// Registry of command-class codecs plus the Get correlation table.
pub struct CommandClassDispatcher {
    codecs: HashMap<u8, Box<dyn CommandClassCodec>>,
    pending: SharedTable,
    next_request_id: AtomicU64,
    reports: broadcast::Sender<NodeReport>,
    wake_ups: broadcast::Sender<NodeId>,
}

impl CommandClassDispatcher {
    /// Dispatcher with every built-in codec registered.
    pub fn new(event_capacity: usize) -> Self {
        let mut dispatcher = Self::empty(event_capacity);
        dispatcher.register(BasicCodec);
        dispatcher.register(MultilevelSwitchCodec);
        dispatcher.register(MultilevelSensorCodec);
        dispatcher.register(ConfigurationCodec);
        dispatcher.register(NotificationCodec);
        dispatcher.register(ManufacturerSpecificCodec);
        dispatcher.register(BatteryCodec);
        dispatcher.register(WakeUpCodec);
        dispatcher.register(ZWavePlusInfoCodec);
        dispatcher
    }

    /// Dispatcher with no codecs.
    pub fn empty(event_capacity: usize) -> Self {
        let capacity = event_capacity.max(1);
        Self {
            codecs: HashMap::new(),
            pending: Arc::new(Mutex::new(PendingTable::default())),
            next_request_id: AtomicU64::new(1),
            reports: broadcast::channel(capacity).0,
            wake_ups: broadcast::channel(capacity).0,
        }
    }

    /// Register a codec, replacing any codec for the same class.
    pub fn register<C: CommandClassCodec>(&mut self, codec: C) {
        self.register_boxed(Box::new(codec));
    }

    pub(crate) fn register_boxed(&mut self, codec: Box<dyn CommandClassCodec>) {
        self.codecs.insert(codec.class_id(), codec);
    }

    pub fn has_codec(&self, class_id: u8) -> bool {
        self.codecs.contains_key(&class_id)
    }

    /// Register a Get for `node_id` before it is sent.
    pub fn register_get(&self, node_id: NodeId, request: &GetRequest) -> Result<PendingReport> {
        let key = PendingKey {
            node_id,
            class_id: request.class_id(),
            report_command: request.report_command,
            filter: request.filter,
        };
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id, key, tx)?;

        tracing::trace!("Registered request {} for {:?}", request_id, key);
        Ok(PendingReport {
            request_id,
            rx,
            table: self.pending.clone(),
        })
    }

    /// Number of outstanding Gets.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).entries.len()
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<NodeReport> {
        self.reports.subscribe()
    }

    pub fn subscribe_wake_ups(&self, node_id: NodeId) -> WakeUpReceiver {
        WakeUpReceiver {
            node_id,
            rx: self.wake_ups.subscribe(),
        }
    }

    /// Decode a payload, unwrapping one CRC16 envelope if present.
    pub fn decode(&self, bytes: &[u8]) -> Result<Report> {
        let class_id = *bytes
            .first()
            .ok_or_else(|| ZWaveError::Decode("empty command class payload".into()))?;

        if class_id == CommandClassId::Crc16Encap as u8 {
            let inner = crc16::decapsulate(bytes)?;
            if inner.first() == Some(&(CommandClassId::Crc16Encap as u8)) {
                return Err(ZWaveError::Protocol("nested CRC16 envelope".into()));
            }
            return self.decode_plain(inner);
        }
        self.decode_plain(bytes)
    }

    fn decode_plain(&self, bytes: &[u8]) -> Result<Report> {
        let class_id = *bytes
            .first()
            .ok_or_else(|| ZWaveError::Decode("empty command class payload".into()))?;
        let codec = self
            .codecs
            .get(&class_id)
            .ok_or(ZWaveError::UnsupportedCommandClass(class_id))?;
        codec.decode(bytes)
    }

    /// Decode an inbound payload from `source`, resolve any pending Get and
    /// publish the report.
    pub fn dispatch(&self, source: NodeId, bytes: &[u8]) -> Result<Report> {
        let report = self.decode(bytes)?;

        if let Some(request_id) = lock(&self.pending).resolve(source, &report) {
            tracing::debug!("Report from node {} resolved request {}", source, request_id);
        }

        if matches!(report, Report::WakeUp(WakeUpReport::Notification)) {
            tracing::debug!("Node {} woke up", source);
            let _ = self.wake_ups.send(source);
        }

        let _ = self.reports.send(NodeReport {
            node_id: source,
            report: report.clone(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_class::basic::{self, BasicReport};
    use crate::command_class::configuration;
    use crate::command_class::multilevel_sensor::{self, SensorType};
    use crate::command_class::Report;

    fn dispatcher() -> CommandClassDispatcher {
        CommandClassDispatcher::new(16)
    }

    #[tokio::test]
    async fn test_report_resolves_matching_get() {
        let d = dispatcher();
        let pending = d.register_get(1, &basic::get()).unwrap();

        d.dispatch(1, &[0x20, 0x03, 0x10]).unwrap();

        let report = pending.wait(Duration::from_millis(100)).await.unwrap();
        assert_eq!(report, Report::Basic(BasicReport { value: 16 }));
        assert_eq!(d.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_report_does_not_resolve() {
        let d = dispatcher();
        let pending = d.register_get(1, &basic::get()).unwrap();

        // Battery report from the same node, Basic report from another node.
        d.dispatch(1, &[0x80, 0x03, 0x50]).unwrap();
        d.dispatch(2, &[0x20, 0x03, 0x10]).unwrap();

        let err = pending.wait(Duration::from_millis(30)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(d.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sensor_filter() {
        let d = dispatcher();
        let humidity = d
            .register_get(3, &multilevel_sensor::get(SensorType::Humidity, 0))
            .unwrap();
        let temperature = d
            .register_get(3, &multilevel_sensor::get(SensorType::AirTemperature, 0))
            .unwrap();

        d.dispatch(3, &[0x31, 0x05, 0x01, 0x22, 0x00, 0xDA]).unwrap();

        let Report::MultilevelSensor(r) = temperature.wait(Duration::from_millis(100)).await.unwrap()
        else {
            panic!("wrong report");
        };
        assert_eq!(r.sensor_type, SensorType::AirTemperature);
        assert_eq!(d.pending_count(), 1);
        drop(humidity);
        assert_eq!(d.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_get_rejected() {
        let d = dispatcher();
        let _first = d.register_get(1, &configuration::get(4)).unwrap();

        assert!(matches!(
            d.register_get(1, &configuration::get(4)),
            Err(ZWaveError::CorrelationInUse {
                node_id: 1,
                class_id: 0x70,
                command: 0x06
            })
        ));
        // Different parameter, different node: fine.
        assert!(d.register_get(1, &configuration::get(5)).is_ok());
        assert!(d.register_get(2, &configuration::get(4)).is_ok());
    }

    #[test]
    fn test_dropped_get_frees_key() {
        let d = dispatcher();
        let first = d.register_get(1, &basic::get()).unwrap();
        drop(first);
        assert!(d.register_get(1, &basic::get()).is_ok());
    }

    #[tokio::test]
    async fn test_crc16_envelope_redispatched() {
        let d = dispatcher();
        let mut reports = d.subscribe_reports();

        let report = d
            .dispatch(1, &[0x56, 0x01, 0x20, 0x03, 0x10, 0x9E, 0x69])
            .unwrap();
        assert_eq!(report, Report::Basic(BasicReport { value: 16 }));
        assert_eq!(reports.recv().await.unwrap().report, report);
    }

    #[test]
    fn test_bad_crc_and_nesting_rejected() {
        let d = dispatcher();
        assert!(matches!(
            d.dispatch(1, &[0x56, 0x01, 0x20, 0x03, 0x11, 0x9E, 0x69]),
            Err(ZWaveError::Crc16Mismatch { .. })
        ));

        let inner = crc16::encapsulate(&[0x20, 0x03, 0x10]);
        let nested = crc16::encapsulate(&inner);
        assert!(matches!(d.dispatch(1, &nested), Err(ZWaveError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_wake_up_scoped_to_node() {
        let d = dispatcher();
        let mut node2 = d.subscribe_wake_ups(2);
        let mut node3 = d.subscribe_wake_ups(3);

        d.dispatch(2, &[0x84, 0x07]).unwrap();

        tokio::time::timeout(Duration::from_millis(100), node2.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(30), node3.recv())
            .await
            .is_err());
    }

    #[test]
    fn test_unknown_class() {
        let d = dispatcher();
        assert!(matches!(
            d.dispatch(1, &[0x99, 0x01]),
            Err(ZWaveError::UnsupportedCommandClass(0x99))
        ));
        assert!(d.dispatch(1, &[]).is_err());
    }

    #[test]
    fn test_custom_codec() {
        struct Thermostat;
        impl CommandClassCodec for Thermostat {
            fn class_id(&self) -> u8 {
                0x40
            }
            fn decode(&self, bytes: &[u8]) -> Result<Report> {
                Ok(crate::command_class::other(bytes))
            }
        }

        let mut d = CommandClassDispatcher::empty(4);
        assert!(!d.has_codec(0x40));
        d.register(Thermostat);
        assert_eq!(d.dispatch(1, &[0x40, 0x03, 0x01]).unwrap().class_id(), 0x40);
    }
}
