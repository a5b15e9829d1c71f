use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Interface counters observed over `[start, last]`.
///
/// Equality compares the covered span and the counters only, not the
/// store's append sequence.
#[derive(Clone, Copy, Debug, Default, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceMetric {
    /// First instant covered by the record.
    pub start: Timestamp,
    /// Last instant covered by the record.
    pub last: Timestamp,
    /// Packets received.
    #[serde(default)]
    pub rx_packets: i64,
    /// Packets transmitted.
    #[serde(default)]
    pub tx_packets: i64,
    /// Bytes received.
    #[serde(default)]
    pub rx_bytes: i64,
    /// Bytes transmitted.
    #[serde(default)]
    pub tx_bytes: i64,
    /// Receive errors.
    #[serde(default)]
    pub rx_errors: i64,
    /// Transmit errors.
    #[serde(default)]
    pub tx_errors: i64,
    /// Received packets dropped.
    #[serde(default)]
    pub rx_dropped: i64,
    /// Transmitted packets dropped.
    #[serde(default)]
    pub tx_dropped: i64,
    /// Append sequence assigned by [`super::MetricStore`]; zero until stored.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl InterfaceMetric {
    /// Empty record covering `[start, last]`.
    pub fn new(start: Timestamp, last: Timestamp) -> Self {
        Self {
            start,
            last,
            ..Default::default()
        }
    }

    /// Sets the packet counters.
    pub fn with_packets(mut self, rx: i64, tx: i64) -> Self {
        self.rx_packets = rx;
        self.tx_packets = tx;
        self
    }

    /// Sets the byte counters.
    pub fn with_bytes(mut self, rx: i64, tx: i64) -> Self {
        self.rx_bytes = rx;
        self.tx_bytes = tx;
        self
    }

    /// Position of the record in the store's global append order, or zero
    /// for a record that was never stored.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Returns true when the record overlaps `[from, to]`.
    pub fn intersects(&self, from: Timestamp, to: Timestamp) -> bool {
        self.start <= to && self.last >= from
    }
}

impl PartialEq for InterfaceMetric {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.last == other.last
            && self.rx_packets == other.rx_packets
            && self.tx_packets == other.tx_packets
            && self.rx_bytes == other.rx_bytes
            && self.tx_bytes == other.tx_bytes
            && self.rx_errors == other.rx_errors
            && self.tx_errors == other.tx_errors
            && self.rx_dropped == other.rx_dropped
            && self.tx_dropped == other.tx_dropped
    }
}

/// Counters saturate at `i64::MAX` rather than wrapping.
impl AddAssign<&InterfaceMetric> for InterfaceMetric {
    fn add_assign(&mut self, other: &InterfaceMetric) {
        self.start = self.start.min(other.start);
        self.last = self.last.max(other.last);
        self.rx_packets = self.rx_packets.saturating_add(other.rx_packets);
        self.tx_packets = self.tx_packets.saturating_add(other.tx_packets);
        self.rx_bytes = self.rx_bytes.saturating_add(other.rx_bytes);
        self.tx_bytes = self.tx_bytes.saturating_add(other.tx_bytes);
        self.rx_errors = self.rx_errors.saturating_add(other.rx_errors);
        self.tx_errors = self.tx_errors.saturating_add(other.tx_errors);
        self.rx_dropped = self.rx_dropped.saturating_add(other.rx_dropped);
        self.tx_dropped = self.tx_dropped.saturating_add(other.tx_dropped);
    }
}

impl Add for InterfaceMetric {
    type Output = InterfaceMetric;

    fn add(mut self, other: InterfaceMetric) -> InterfaceMetric {
        self += &other;
        self
    }
}
