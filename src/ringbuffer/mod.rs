//! Ring Buffer (C5): bounded per-stream rolling buffer, persisted to Redis
//! keyed by recording id with TTL = 2x buffer duration.

use crate::error::{PipelineError, Result, StorageErrorKind};
use deadpool_redis::{redis::AsyncCommands, Pool};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingBufferState {
    pub sample_rate: f64,
    pub capacity_samples: usize,
    /// `[channel][sample]`.
    pub data: Vec<Vec<f64>>,
}

impl RingBufferState {
    fn empty(sample_rate: f64, capacity_seconds: u64, n_channels: usize) -> Self {
        Self {
            sample_rate,
            capacity_samples: (capacity_seconds as f64 * sample_rate).round() as usize,
            data: vec![Vec::new(); n_channels],
        }
    }

    /// Append new samples on the time axis, then drop the oldest samples
    /// so that length == capacity, per §4.5.
    fn append(&mut self, chunk: &[Vec<f64>]) {
        if self.data.len() != chunk.len() {
            self.data = vec![Vec::new(); chunk.len()];
        }
        for (channel, new_samples) in self.data.iter_mut().zip(chunk.iter()) {
            channel.extend_from_slice(new_samples);
            if channel.len() > self.capacity_samples {
                let drop_count = channel.len() - self.capacity_samples;
                channel.drain(0..drop_count);
            }
        }
    }

    fn get_last(&self, duration_seconds: f64) -> Option<Vec<Vec<f64>>> {
        if self.data.is_empty() || self.data[0].is_empty() {
            return None;
        }
        let n = (duration_seconds * self.sample_rate).round() as usize;
        Some(
            self.data
                .iter()
                .map(|channel| {
                    let take = n.min(channel.len());
                    channel[channel.len() - take..].to_vec()
                })
                .collect(),
        )
    }
}

pub struct RingBuffer {
    pool: Pool,
}

fn key_for(recording_id: &str) -> String {
    format!("ringbuffer:{recording_id}")
}

impl RingBuffer {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        recording_id: &str,
        chunk: &[Vec<f64>],
        sample_rate: f64,
        capacity_seconds: u64,
    ) -> Result<()> {
        let mut conn = self.connection().await?;
        let key = key_for(recording_id);

        let raw: Option<Vec<u8>> = conn
            .get(&key)
            .await
            .map_err(|e| PipelineError::storage(StorageErrorKind::Transient, e.to_string()))?;

        let mut state = match raw {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| PipelineError::storage(StorageErrorKind::Fatal, e.to_string()))?,
            None => RingBufferState::empty(sample_rate, capacity_seconds, chunk.len()),
        };
        state.append(chunk);

        let serialized = bincode::serialize(&state)
            .map_err(|e| PipelineError::storage(StorageErrorKind::Fatal, e.to_string()))?;
        let ttl = 2 * capacity_seconds;
        conn.set_ex::<_, _, ()>(&key, serialized, ttl)
            .await
            .map_err(|e| PipelineError::storage(StorageErrorKind::Transient, e.to_string()))?;
        Ok(())
    }

    pub async fn get_last(&self, recording_id: &str, duration_seconds: f64) -> Result<Option<Vec<Vec<f64>>>> {
        let state = self.load(recording_id).await?;
        Ok(state.and_then(|s| s.get_last(duration_seconds)))
    }

    pub async fn buffered_seconds(&self, recording_id: &str) -> Result<f64> {
        let state = self.load(recording_id).await?;
        Ok(state
            .and_then(|s| s.data.first().map(|c| c.len() as f64 / s.sample_rate))
            .unwrap_or(0.0))
    }

    pub async fn clear(&self, recording_id: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(key_for(recording_id))
            .await
            .map_err(|e| PipelineError::storage(StorageErrorKind::Transient, e.to_string()))?;
        Ok(())
    }

    async fn load(&self, recording_id: &str) -> Result<Option<RingBufferState>> {
        let mut conn = self.connection().await?;
        let raw: Option<Vec<u8>> = conn
            .get(key_for(recording_id))
            .await
            .map_err(|e| PipelineError::storage(StorageErrorKind::Transient, e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes)
                .map_err(|e| PipelineError::storage(StorageErrorKind::Fatal, e.to_string()))
        })
        .transpose()
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| PipelineError::storage(StorageErrorKind::Transient, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_drops_oldest_samples_past_capacity() {
        let mut state = RingBufferState::empty(10.0, 2, 1);
        state.append(&[vec![1.0; 15]]);
        assert_eq!(state.data[0].len(), 20.min(15));
    }

    #[test]
    fn get_last_returns_trailing_window() {
        let mut state = RingBufferState::empty(10.0, 5, 1);
        state.append(&[(0..50).map(|i| i as f64).collect()]);
        let last = state.get_last(1.0).unwrap();
        assert_eq!(last[0].len(), 10);
        assert_eq!(*last[0].last().unwrap(), 49.0);
    }

    #[test]
    fn empty_buffer_returns_none() {
        let state = RingBufferState::empty(10.0, 5, 1);
        assert!(state.get_last(1.0).is_none());
    }
}
