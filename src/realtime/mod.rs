//! Realtime Processor (C6): lightweight filter + feature extraction +
//! inference over streaming chunks, bypassing the job orchestrator.

pub mod message;

pub use message::{EgressMessage, IngressMessage};

use crate::config::PipelineConfig;
use crate::dsp::filters;
use crate::error::{PipelineError, Result};
use crate::ringbuffer::RingBuffer;
use crate::trainer::LoadedModel;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct RealtimeProcessor {
    ring_buffer: Arc<RingBuffer>,
    config: PipelineConfig,
}

impl RealtimeProcessor {
    pub fn new(ring_buffer: Arc<RingBuffer>, config: PipelineConfig) -> Self {
        Self { ring_buffer, config }
    }

    /// Drain a single ingress message, producing zero or more egress
    /// messages. This is the channel-draining handler named in Design
    /// Notes §9; a real transport would forward these to subscribers.
    pub async fn handle_ingress(&self, msg: IngressMessage, model: Option<&LoadedModel>) -> Result<Vec<EgressMessage>> {
        match msg {
            IngressMessage::StreamData { recording_id, chunk, sfreq } => {
                self.on_stream_data(recording_id, chunk, sfreq as f64).await
            }
            IngressMessage::RequestInference { recording_id, model_id } => {
                let Some(model) = model else {
                    return Err(PipelineError::Model(format!("model {model_id} not loaded")));
                };
                self.request_inference(recording_id, model).await
            }
            IngressMessage::JoinRecording { .. }
            | IngressMessage::LeaveRecording { .. }
            | IngressMessage::SubscribeJob { .. } => Ok(Vec::new()),
        }
    }

    async fn on_stream_data(
        &self,
        recording_id: Uuid,
        chunk: Vec<Vec<f64>>,
        sfreq: f64,
    ) -> Result<Vec<EgressMessage>> {
        self.ring_buffer
            .append(
                &recording_id.to_string(),
                &chunk,
                sfreq,
                self.config.realtime.buffer_seconds,
            )
            .await?;

        let buffered = self.ring_buffer.buffered_seconds(&recording_id.to_string()).await?;
        if buffered < 2.0 {
            return Ok(vec![EgressMessage::Buffering { recording_id }]);
        }

        let Some(buffer) = self
            .ring_buffer
            .get_last(&recording_id.to_string(), buffered)
            .await?
        else {
            return Ok(vec![EgressMessage::Buffering { recording_id }]);
        };

        let features = self.extract_features(&buffer, sfreq);
        Ok(vec![EgressMessage::RealtimeFeatures {
            recording_id,
            timestamp: Utc::now(),
            features,
        }])
    }

    /// Notch + 4th-order Butterworth bandpass (forward-backward), the
    /// last `hop_seconds` window, averaged across channels.
    fn extract_features(&self, buffer: &[Vec<f64>], sfreq: f64) -> BTreeMap<String, f64> {
        let line_freq = self.config.notch_freqs.first().copied().unwrap_or(50.0);

        let cleaned: Vec<Vec<f64>> = buffer
            .iter()
            .map(|channel| {
                let notched = filters::apply_biquad_cascade_zero_phase(channel, || {
                    vec![filters::notch_biquad(line_freq, sfreq, 30.0)]
                });
                filters::apply_biquad_cascade_zero_phase(&notched, || {
                    filters::butterworth_bandpass_stages(
                        self.config.bandpass.low,
                        self.config.bandpass.high,
                        sfreq,
                    )
                })
            })
            .collect();

        let hop_samples = (self.config.realtime.hop_seconds * sfreq).round() as usize;
        let windows: Vec<Vec<f64>> = cleaned
            .iter()
            .map(|channel| {
                let start = channel.len().saturating_sub(hop_samples);
                channel[start..].to_vec()
            })
            .collect();

        let mut features = BTreeMap::new();
        for band in &self.config.features.bands {
            let mut band_power_sum = 0.0;
            let mut total_power_sum = 0.0;
            for channel in &windows {
                let power = crate::features::quick_band_power(channel, sfreq, band.low, band.high);
                let total = crate::features::quick_band_power(channel, sfreq, 1.0, 45.0).max(1e-12);
                band_power_sum += power;
                total_power_sum += total;
            }
            let n = windows.len().max(1) as f64;
            features.insert(format!("band_{}", band.name), band_power_sum / n);
            features.insert(format!("rel_{}", band.name), band_power_sum / total_power_sum.max(1e-12));
        }

        let rms = windows
            .iter()
            .map(|c| (c.iter().map(|v| v * v).sum::<f64>() / c.len().max(1) as f64).sqrt())
            .sum::<f64>()
            / windows.len().max(1) as f64;
        let std = windows
            .iter()
            .map(|c| {
                let mean = c.iter().sum::<f64>() / c.len().max(1) as f64;
                (c.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / c.len().max(1) as f64).sqrt()
            })
            .sum::<f64>()
            / windows.len().max(1) as f64;
        features.insert("rms".to_string(), rms);
        features.insert("std".to_string(), std);
        features
    }

    async fn request_inference(&self, recording_id: Uuid, model: &LoadedModel) -> Result<Vec<EgressMessage>> {
        let buffered = self.ring_buffer.buffered_seconds(&recording_id.to_string()).await?;
        let Some(buffer) = self
            .ring_buffer
            .get_last(&recording_id.to_string(), buffered)
            .await?
        else {
            return Err(PipelineError::Data("no buffered data for inference".into()));
        };
        let sfreq = self.config.target_sfreq as f64;
        let feature_dict = self.extract_features(&buffer, sfreq);

        let vector: Vec<f64> = model
            .feature_names
            .iter()
            .map(|name| feature_dict.get(name).copied().unwrap_or(0.0))
            .collect();

        let (prediction, probability, probabilities) = crate::trainer::predict_with_model(model, &vector)?;

        Ok(vec![EgressMessage::RealtimePrediction {
            recording_id,
            prediction,
            probability,
            probabilities,
            timestamp: Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_redis::Config as RedisConfig;

    fn test_processor() -> RealtimeProcessor {
        let pool = RedisConfig::from_url("redis://127.0.0.1/")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .expect("pool config is valid even without a live connection");
        RealtimeProcessor::new(Arc::new(RingBuffer::new(pool)), PipelineConfig::default())
    }

    #[test]
    fn extract_features_includes_every_configured_band() {
        let processor = test_processor();
        let sfreq = 250.0;
        let window: Vec<f64> = (0..500)
            .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / sfreq).sin())
            .collect();
        let buffer = vec![window];
        let features = processor.extract_features(&buffer, sfreq);
        for band in &processor.config.features.bands {
            assert!(features.contains_key(&format!("band_{}", band.name)));
            assert!(features.contains_key(&format!("rel_{}", band.name)));
        }
    }
}
