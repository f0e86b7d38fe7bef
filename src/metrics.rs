//! Live metrics state and Prometheus text rendering.
//!
//! [`MeterMetrics`] is an explicitly constructed registry passed to the
//! dispatch loop and the HTTP server; nothing here is process-global.
//! Series names are kept byte-for-byte compatible with the original
//! exporter (including the `delievered_watthours` spelling) so existing
//! dashboards and alerts keep working.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::message::MessageKind;

/// A unique identifier for one labeled time series.
///
/// All four exported series are addressed by this key family; a physical
/// meter always maps to the same label values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeterKey {
    pub device_mac_id: String,
    pub meter_mac_id: String,
}

impl MeterKey {
    pub fn new(device_mac_id: &str, meter_mac_id: &str) -> Self {
        Self {
            device_mac_id: device_mac_id.to_string(),
            meter_mac_id: meter_mac_id.to_string(),
        }
    }
}

/// Thread-safe live metrics registry.
///
/// Each series family has its own lock, so an update is atomic per series
/// and a scrape never sees a torn value. Cross-series atomicity is not
/// promised. Label sets are never deleted; the cache grows monotonically,
/// matching Prometheus client retention semantics.
#[derive(Debug, Default)]
pub struct MeterMetrics {
    /// Current demand in watts, per meter.
    demand: RwLock<HashMap<MeterKey, u64>>,
    /// Cumulative delivered energy in watt-hours, per meter.
    delivered: RwLock<HashMap<MeterKey, u64>>,
    /// Messages processed, per meter and kind.
    messages: RwLock<HashMap<(MeterKey, MessageKind), u64>>,
    /// Unix timestamp of the last message, per meter and kind.
    last_seen: RwLock<HashMap<(MeterKey, MessageKind), u64>>,
}

/// Shareable registry handle.
pub type SharedMetrics = Arc<MeterMetrics>;

impl MeterMetrics {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute set of the power gauge for one meter.
    pub fn set_demand(&self, device_mac_id: &str, meter_mac_id: &str, watts: u64) {
        self.demand
            .write()
            .insert(MeterKey::new(device_mac_id, meter_mac_id), watts);
    }

    /// Absolute set of the cumulative-energy gauge for one meter.
    pub fn set_delivered(&self, device_mac_id: &str, meter_mac_id: &str, watt_hours: u64) {
        self.delivered
            .write()
            .insert(MeterKey::new(device_mac_id, meter_mac_id), watt_hours);
    }

    /// Monotonic increment of the per-kind message counter.
    pub fn inc_messages(&self, device_mac_id: &str, meter_mac_id: &str, kind: MessageKind) {
        let mut messages = self.messages.write();
        *messages
            .entry((MeterKey::new(device_mac_id, meter_mac_id), kind))
            .or_insert(0) += 1;
    }

    /// Record the current wall-clock time as the last-seen timestamp.
    pub fn touch_last_seen(&self, device_mac_id: &str, meter_mac_id: &str, kind: MessageKind) {
        self.touch_last_seen_at(device_mac_id, meter_mac_id, kind, unix_now());
    }

    /// Record an explicit last-seen timestamp. Used by [`touch_last_seen`]
    /// and by tests that need a fixed clock.
    ///
    /// [`touch_last_seen`]: MeterMetrics::touch_last_seen
    pub fn touch_last_seen_at(
        &self,
        device_mac_id: &str,
        meter_mac_id: &str,
        kind: MessageKind,
        epoch_secs: u64,
    ) {
        self.last_seen
            .write()
            .insert((MeterKey::new(device_mac_id, meter_mac_id), kind), epoch_secs);
    }

    /// Current value of the power gauge for one meter.
    pub fn demand_watts(&self, device_mac_id: &str, meter_mac_id: &str) -> Option<u64> {
        self.demand
            .read()
            .get(&MeterKey::new(device_mac_id, meter_mac_id))
            .copied()
    }

    /// Current value of the cumulative-energy gauge for one meter.
    pub fn delivered_watthours(&self, device_mac_id: &str, meter_mac_id: &str) -> Option<u64> {
        self.delivered
            .read()
            .get(&MeterKey::new(device_mac_id, meter_mac_id))
            .copied()
    }

    /// Current value of the per-kind message counter for one meter.
    pub fn message_count(
        &self,
        device_mac_id: &str,
        meter_mac_id: &str,
        kind: MessageKind,
    ) -> Option<u64> {
        self.messages
            .read()
            .get(&(MeterKey::new(device_mac_id, meter_mac_id), kind))
            .copied()
    }

    /// Whether any message has been dispatched since startup.
    pub fn message_seen(&self) -> bool {
        !self.messages.read().is_empty()
    }

    /// Render the full metric set in Prometheus exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);

        render_meter_series(
            &mut out,
            "demand_watts",
            "gauge",
            "Current demand in watts",
            &self.demand.read(),
        );
        render_meter_series(
            &mut out,
            "delievered_watthours",
            "gauge",
            "Current meter reading in watt hours",
            &self.delivered.read(),
        );
        render_kind_series(
            &mut out,
            "messages_count",
            "counter",
            "Number of messages received",
            &self.messages.read(),
        );
        render_kind_series(
            &mut out,
            "last_message_received",
            "gauge",
            "Timestamp of last message received",
            &self.last_seen.read(),
        );

        out
    }
}

/// Render a series family labeled by meter identity only.
fn render_meter_series(
    out: &mut String,
    name: &str,
    metric_type: &str,
    help: &str,
    values: &HashMap<MeterKey, u64>,
) {
    if values.is_empty() {
        return;
    }

    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();

    let mut keys: Vec<_> = values.keys().collect();
    keys.sort();
    for key in keys {
        writeln!(
            out,
            "{}{{device_mac_id=\"{}\",meter_mac_id=\"{}\"}} {}",
            name,
            escape_label_value(&key.device_mac_id),
            escape_label_value(&key.meter_mac_id),
            values[key]
        )
        .ok();
    }
}

/// Render a series family labeled by meter identity and message kind.
fn render_kind_series(
    out: &mut String,
    name: &str,
    metric_type: &str,
    help: &str,
    values: &HashMap<(MeterKey, MessageKind), u64>,
) {
    if values.is_empty() {
        return;
    }

    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();

    let mut keys: Vec<_> = values.keys().collect();
    keys.sort();
    for key in keys {
        let (meter, kind) = key;
        writeln!(
            out,
            "{}{{device_mac_id=\"{}\",meter_mac_id=\"{}\",message_type=\"{}\"}} {}",
            name,
            escape_label_value(&meter.device_mac_id),
            escape_label_value(&meter.meter_mac_id),
            kind.as_str(),
            values[key]
        )
        .ok();
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Seconds since the Unix epoch.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
