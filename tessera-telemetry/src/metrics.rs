//! Prometheus counters for connection and frame activity.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

use crate::TelemetryError;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub sockets_opened: IntCounter,
    pub sockets_closed: IntCounter,
    pub sockets_active: IntGauge,
    pub frames_received: IntCounter,
    pub frames_rejected: IntCounter,
    pub frames_sent: IntCounter,
    pub messages_dispatched: IntCounter,
    pub messages_skipped: IntCounter,
    pub frame_size: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let sockets_opened =
            IntCounter::new("tessera_sockets_opened_total", "Sockets accepted or connected")?;
        let sockets_closed = IntCounter::new("tessera_sockets_closed_total", "Sockets closed")?;
        let sockets_active = IntGauge::new("tessera_sockets_active", "Sockets currently open")?;
        let frames_received =
            IntCounter::new("tessera_frames_received_total", "Frames read off the wire")?;
        let frames_rejected = IntCounter::new(
            "tessera_frames_rejected_total",
            "Frames with an invalid size prefix",
        )?;
        let frames_sent = IntCounter::new("tessera_frames_sent_total", "Frames written")?;
        let messages_dispatched = IntCounter::new(
            "tessera_messages_dispatched_total",
            "Messages published on the event bus",
        )?;
        let messages_skipped = IntCounter::new(
            "tessera_messages_skipped_total",
            "Frames dropped because their messages failed to decode",
        )?;
        let frame_size = Histogram::with_opts(
            HistogramOpts::new("tessera_frame_size_bytes", "Received frame payload size")
                .buckets(vec![64.0, 1_024.0, 16_384.0, 262_144.0, 4_194_304.0]),
        )?;

        registry.register(Box::new(sockets_opened.clone()))?;
        registry.register(Box::new(sockets_closed.clone()))?;
        registry.register(Box::new(sockets_active.clone()))?;
        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(frames_rejected.clone()))?;
        registry.register(Box::new(frames_sent.clone()))?;
        registry.register(Box::new(messages_dispatched.clone()))?;
        registry.register(Box::new(messages_skipped.clone()))?;
        registry.register(Box::new(frame_size.clone()))?;

        Ok(Self {
            registry,
            sockets_opened,
            sockets_closed,
            sockets_active,
            frames_received,
            frames_rejected,
            frames_sent,
            messages_dispatched,
            messages_skipped,
            frame_size,
        })
    }

    pub fn socket_opened(&self) {
        self.sockets_opened.inc();
        self.sockets_active.inc();
    }

    pub fn socket_closed(&self) {
        self.sockets_closed.inc();
        self.sockets_active.dec();
    }

    pub fn frame_received(&self, size: usize) {
        self.frames_received.inc();
        self.frame_size.observe(size as f64);
    }

    pub fn gather_metrics(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
