//! Lock-free mirrors of connection state
//!
//! The state machine owns the authoritative phase. These atomics let the
//! client handle answer `phase()` and `metrics()` without a round trip to
//! the actor task.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionPhase {
    Disconnected = 0,
    Handshaking = 1,
    Connected = 2,
}

impl ConnectionPhase {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionPhase::Handshaking,
            2 => ConnectionPhase::Connected,
            _ => ConnectionPhase::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Handshaking => "handshaking",
            ConnectionPhase::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Atomic connection phase
#[derive(Debug)]
pub struct AtomicConnectionPhase {
    inner: AtomicU8,
}

impl AtomicConnectionPhase {
    pub fn new(phase: ConnectionPhase) -> Self {
        Self {
            inner: AtomicU8::new(phase as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, phase: ConnectionPhase) {
        self.inner.store(phase as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionPhase::Connected
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.get() == ConnectionPhase::Disconnected
    }
}

impl Default for AtomicConnectionPhase {
    fn default() -> Self {
        Self::new(ConnectionPhase::Disconnected)
    }
}

/// Atomic frame counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    protocol_violations: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_violations(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trips_through_atomic() {
        let phase = AtomicConnectionPhase::default();
        assert!(phase.is_disconnected());

        phase.set(ConnectionPhase::Handshaking);
        assert_eq!(phase.get(), ConnectionPhase::Handshaking);

        phase.set(ConnectionPhase::Connected);
        assert!(phase.is_connected());
    }
}
