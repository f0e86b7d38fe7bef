//! Dispatch loop: bytes in, metric updates out.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

use crate::convert::convert;
use crate::error::{PipelineError, Result};
use crate::message::{MessageKind, RavenMessage};
use crate::metrics::SharedMetrics;
use crate::scanner::XmlScanner;

const READ_BUF_SIZE: usize = 4096;

/// The ingestion pipeline.
///
/// Strictly sequential: blocks on the stream, frames one message at a
/// time, and applies its updates before pulling the next. A stalled
/// device stalls the loop indefinitely; there is no read timeout.
pub struct Pipeline {
    metrics: SharedMetrics,
    scanner: XmlScanner,
}

impl Pipeline {
    /// Create a pipeline updating the given registry.
    pub fn new(metrics: SharedMetrics) -> Self {
        Self {
            metrics,
            scanner: XmlScanner::new(),
        }
    }

    /// Consume the byte stream until it ends or a fault occurs.
    ///
    /// Returns `Ok(())` only on a clean end of stream. Any stream, frame,
    /// parse, or conversion fault aborts the loop; there is no skip-and-
    /// continue, because the wire has no resynchronization marker.
    pub async fn run<R>(mut self, mut stream: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; READ_BUF_SIZE];

        loop {
            while let Some(message) = self.scanner.try_next()? {
                self.dispatch(&message)?;
            }

            let n = stream.read(&mut buf).await.map_err(PipelineError::Stream)?;
            if n == 0 {
                return Ok(());
            }
            self.scanner.push(&buf[..n]);
        }
    }

    /// Route one message to its metric updates.
    fn dispatch(&self, message: &RavenMessage) -> Result<()> {
        match message {
            RavenMessage::Demand(demand) => {
                let reading = demand.reading()?;
                let watts = convert(reading.value, reading.multiplier, reading.divisor)?;

                info!(meter = %demand.meter_mac_id, watts, "demand reading");

                self.metrics
                    .set_demand(&demand.device_mac_id, &demand.meter_mac_id, watts);
                self.metrics.inc_messages(
                    &demand.device_mac_id,
                    &demand.meter_mac_id,
                    MessageKind::Demand,
                );
                self.metrics.touch_last_seen(
                    &demand.device_mac_id,
                    &demand.meter_mac_id,
                    MessageKind::Demand,
                );
            }
            RavenMessage::Summation(summation) => {
                let reading = summation.reading()?;
                let watt_hours = convert(reading.value, reading.multiplier, reading.divisor)?;

                info!(meter = %summation.meter_mac_id, watt_hours, "total delivered reading");

                self.metrics.set_delivered(
                    &summation.device_mac_id,
                    &summation.meter_mac_id,
                    watt_hours,
                );
                self.metrics.inc_messages(
                    &summation.device_mac_id,
                    &summation.meter_mac_id,
                    MessageKind::Summation,
                );
                self.metrics.touch_last_seen(
                    &summation.device_mac_id,
                    &summation.meter_mac_id,
                    MessageKind::Summation,
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MeterMetrics;
    use std::sync::Arc;

    const DEMAND: &str = "<InstantaneousDemand>\
         <DeviceMacId>D1</DeviceMacId><MeterMacId>M1</MeterMacId>\
         <Demand>0x0a</Demand><Multiplier>0x01</Multiplier><Divisor>0x01</Divisor>\
         </InstantaneousDemand>";

    const SUMMATION: &str = "<CurrentSummationDelivered>\
         <DeviceMacId>D1</DeviceMacId><MeterMacId>M1</MeterMacId>\
         <SummationDelivered>0x00291b05</SummationDelivered>\
         <Multiplier>0x01</Multiplier><Divisor>0x000003e8</Divisor>\
         </CurrentSummationDelivered>";

    #[tokio::test]
    async fn test_demand_message_updates_only_demand_series() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        pipeline.run(DEMAND.as_bytes()).await.unwrap();

        // 10 * 1 * 1000 / 1 = 10000 watts.
        assert_eq!(metrics.demand_watts("D1", "M1"), Some(10_000));
        assert_eq!(metrics.delivered_watthours("D1", "M1"), None);
        assert_eq!(metrics.message_count("D1", "M1", MessageKind::Demand), Some(1));
        assert_eq!(metrics.message_count("D1", "M1", MessageKind::Summation), None);
    }

    #[tokio::test]
    async fn test_demand_then_summation() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        let stream = format!("{}{}", DEMAND, SUMMATION);
        pipeline.run(stream.as_bytes()).await.unwrap();

        assert_eq!(metrics.demand_watts("D1", "M1"), Some(10_000));
        // 0x291b05 = 2693893; 2693893 * 1 * 1000 / 1000 = 2693893 Wh.
        assert_eq!(metrics.delivered_watthours("D1", "M1"), Some(2_693_893));
        assert_eq!(metrics.message_count("D1", "M1", MessageKind::Demand), Some(1));
        assert_eq!(
            metrics.message_count("D1", "M1", MessageKind::Summation),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_interleaved_markup_is_ignored() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        let stream = format!(
            "<TimeCluster><UTCTime>0x2b9d5f20</UTCTime></TimeCluster>{}\
             <ConnectionStatus><Status>Connected</Status></ConnectionStatus>{}",
            DEMAND, SUMMATION
        );
        pipeline.run(stream.as_bytes()).await.unwrap();

        assert_eq!(metrics.demand_watts("D1", "M1"), Some(10_000));
        assert_eq!(metrics.delivered_watthours("D1", "M1"), Some(2_693_893));
    }

    #[tokio::test]
    async fn test_parse_fault_is_fatal_and_updates_nothing() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        let bad = "<InstantaneousDemand>\
             <DeviceMacId>D1</DeviceMacId><MeterMacId>M1</MeterMacId>\
             <Demand>garbage</Demand><Multiplier>0x01</Multiplier><Divisor>0x01</Divisor>\
             </InstantaneousDemand>";

        let err = pipeline.run(bad.as_bytes()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));

        // The failed message must not partially update the registry.
        assert_eq!(metrics.demand_watts("D1", "M1"), None);
        assert_eq!(metrics.message_count("D1", "M1", MessageKind::Demand), None);
        assert!(!metrics.message_seen());
    }

    #[tokio::test]
    async fn test_zero_divisor_is_fatal() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        let bad = "<InstantaneousDemand>\
             <DeviceMacId>D1</DeviceMacId><MeterMacId>M1</MeterMacId>\
             <Demand>0x0a</Demand><Multiplier>0x01</Multiplier><Divisor>0x00</Divisor>\
             </InstantaneousDemand>";

        let err = pipeline.run(bad.as_bytes()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Convert(_)));
        assert_eq!(metrics.demand_watts("D1", "M1"), None);
    }

    #[tokio::test]
    async fn test_frame_fault_stops_after_earlier_messages() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        // A valid demand, then a malformed summation fragment.
        let stream = format!(
            "{}<CurrentSummationDelivered><SummationDelivered>0x01\
             </CurrentSummationDelivered>",
            DEMAND
        );
        let err = pipeline.run(stream.as_bytes()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Frame(_)));

        // The earlier message was applied before the fault.
        assert_eq!(metrics.demand_watts("D1", "M1"), Some(10_000));
        assert_eq!(
            metrics.message_count("D1", "M1", MessageKind::Summation),
            None
        );
    }

    #[tokio::test]
    async fn test_truncated_tail_ends_cleanly() {
        let metrics = Arc::new(MeterMetrics::new());
        let pipeline = Pipeline::new(metrics.clone());

        // A complete message followed by a fragment cut off mid-element.
        let stream = format!("{}<InstantaneousDemand><DeviceMacId>D1", DEMAND);
        pipeline.run(stream.as_bytes()).await.unwrap();

        assert_eq!(metrics.message_count("D1", "M1", MessageKind::Demand), Some(1));
    }
}
