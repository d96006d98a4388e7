//! The egress sink interface: the Decoder hands completed WiFi frames to
//! this non-blocking collaborator. In production it's the XLink Kai UDP
//! client; that client lives outside this crate, so callers supply their
//! own implementation.

/// Receives reassembled WiFi frames. Implementations must not block —
/// they're called from the Bus Pump thread in the middle of its read/write
/// turn, and any delay here delays USB servicing.
pub trait EgressSink: Send + Sync {
    fn send(&self, frame: &[u8]);
}

/// A sink that logs every frame at `info` level. Useful for the demo
/// binary and for tests; stands in for a real XLink Kai client.
pub struct LoggingSink {
    label: &'static str,
}

impl LoggingSink {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl EgressSink for LoggingSink {
    fn send(&self, frame: &[u8]) {
        log::info!("{}: {} byte frame", self.label, frame.len());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::EgressSink;
    use std::sync::Mutex;

    /// Collects every frame it receives, for assertions in tests.
    #[derive(Default)]
    pub struct CollectingSink {
        pub frames: Mutex<Vec<Vec<u8>>>,
    }

    impl EgressSink for CollectingSink {
        fn send(&self, frame: &[u8]) {
            self.frames.lock().unwrap().push(frame.to_vec());
        }
    }
}
