//! Bounded position history for lag compensation

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A recorded hitbox position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server time in seconds
    pub timestamp: f32,
    pub position: Vec3,
}

/// Time-ordered ring of snapshots, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBuffer {
    samples: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffer seeded with one sample
    pub fn seeded(capacity: usize, timestamp: f32, position: Vec3) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.push(timestamp, position);
        buffer
    }

    /// Append a sample, evicting the oldest beyond capacity
    pub fn push(&mut self, timestamp: f32, position: Vec3) {
        self.samples.push_back(Snapshot { timestamp, position });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.samples.iter()
    }

    /// Estimated position at `timestamp`.
    ///
    /// Walks back from the newest sample to the pair bracketing `timestamp`
    /// and interpolates between them. Earlier than all samples yields the
    /// oldest position. Later than the newest sample, or an empty buffer,
    /// yields `None` so the caller can use the live position instead.
    pub fn position_at(&self, timestamp: f32) -> Option<Vec3> {
        let newest = self.samples.back()?;
        if timestamp > newest.timestamp {
            return None;
        }

        for i in (1..self.samples.len()).rev() {
            let older = &self.samples[i - 1];
            if older.timestamp <= timestamp {
                let newer = &self.samples[i];
                let span = newer.timestamp - older.timestamp;
                let alpha = if span > 0.0 {
                    ((timestamp - older.timestamp) / span).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                return Some(older.position.lerp(newer.position, alpha));
            }
        }

        self.samples.front().map(|s| s.position)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_samples() -> SnapshotBuffer {
        let mut buffer = SnapshotBuffer::new(50);
        buffer.push(0.0, Vec3::ZERO);
        buffer.push(10.0, Vec3::new(100.0, 0.0, 0.0));
        buffer
    }

    #[test]
    fn test_interpolates_between_samples() {
        let buffer = two_samples();
        assert_eq!(buffer.position_at(5.0), Some(Vec3::new(50.0, 0.0, 0.0)));
        assert_eq!(buffer.position_at(10.0), Some(Vec3::new(100.0, 0.0, 0.0)));
        assert_eq!(buffer.position_at(0.0), Some(Vec3::ZERO));
    }

    #[test]
    fn test_before_history_returns_oldest() {
        let buffer = two_samples();
        assert_eq!(buffer.position_at(-5.0), Some(Vec3::ZERO));
    }

    #[test]
    fn test_after_history_defers_to_live() {
        let buffer = two_samples();
        assert_eq!(buffer.position_at(20.0), None);
        assert_eq!(SnapshotBuffer::new(4).position_at(0.0), None);
    }

    #[test]
    fn test_picks_latest_bracket() {
        let mut buffer = SnapshotBuffer::new(50);
        buffer.push(0.0, Vec3::ZERO);
        buffer.push(1.0, Vec3::new(10.0, 0.0, 0.0));
        buffer.push(2.0, Vec3::new(10.0, 0.0, 10.0));
        let p = buffer.position_at(1.5).unwrap();
        assert!((p - Vec3::new(10.0, 0.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_single_sample() {
        let buffer = SnapshotBuffer::seeded(50, 3.0, Vec3::ONE);
        assert_eq!(buffer.position_at(1.0), Some(Vec3::ONE));
        assert_eq!(buffer.position_at(3.0), Some(Vec3::ONE));
        assert_eq!(buffer.position_at(3.5), None);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut buffer = SnapshotBuffer::new(50);
        for i in 0..60 {
            buffer.push(i as f32, Vec3::new(i as f32, 0.0, 0.0));
        }
        assert_eq!(buffer.len(), 50);
        assert_eq!(buffer.oldest().unwrap().timestamp, 10.0);
        assert_eq!(buffer.newest().unwrap().timestamp, 59.0);
        let times: Vec<f32> = buffer.iter().map(|s| s.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}
