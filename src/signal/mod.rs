//! Signal I/O (C2): decode recording formats into an in-memory
//! multichannel buffer, and serialize/deserialize the cleaned buffer
//! through a stable internal container.

mod montage;

pub use montage::{normalize_channel_name, Montage};

use crate::error::Result;
use crate::model::RecordingFormat;
use serde::{Deserialize, Serialize};

/// `[channel][sample]` double-precision buffer plus the metadata every
/// downstream stage needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalBuffer {
    pub channel_labels: Vec<String>,
    pub sample_rate: f64,
    pub data: Vec<Vec<f64>>,
    pub montage: Option<Montage>,
}

impl SignalBuffer {
    pub fn n_channels(&self) -> usize {
        self.data.len()
    }

    pub fn n_samples(&self) -> usize {
        self.data.first().map_or(0, |c| c.len())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.n_samples() as f64 / self.sample_rate
    }

    pub fn normalize_channel_names(&mut self) {
        for label in &mut self.channel_labels {
            *label = normalize_channel_name(label);
        }
    }
}

/// Decode a recording file by its format tag. Unsupported extensions are
/// rejected before this is even called (see [`RecordingFormat::from_extension`]).
pub fn decode(bytes: &[u8], format: RecordingFormat) -> Result<SignalBuffer> {
    let mut buffer = match format {
        RecordingFormat::Edf => edf::decode(bytes, false)?,
        RecordingFormat::Bdf => edf::decode(bytes, true)?,
        RecordingFormat::Fif => fif::decode(bytes)?,
        RecordingFormat::Eeglab => eeglab::decode(bytes)?,
    };
    buffer.normalize_channel_names();
    Ok(buffer)
}

/// Serialize the cleaned buffer to the internal FIF-like container used for
/// the `processed/{recording}/cleaned_raw.fif` artifact.
pub fn encode_fif(buffer: &SignalBuffer) -> Result<Vec<u8>> {
    fif::encode(buffer)
}

pub fn decode_fif(bytes: &[u8]) -> Result<SignalBuffer> {
    fif::decode(bytes)
}

/// EDF/BDF: a real (if minimal) reader of the standard 256-byte header
/// followed by per-record, per-channel interleaved samples.
mod edf {
    use super::SignalBuffer;
    use crate::error::{PipelineError, Result};

    const HEADER_LEN: usize = 256;

    pub fn decode(bytes: &[u8], is_bdf: bool) -> Result<SignalBuffer> {
        if bytes.len() < HEADER_LEN {
            return Err(PipelineError::Format("truncated EDF/BDF header".into()));
        }
        let header = &bytes[..HEADER_LEN];
        let n_records: i32 = parse_ascii_field(header, 236, 8)?;
        let record_duration: f64 = parse_ascii_field_f64(header, 244, 8)?;
        let n_signals: usize = parse_ascii_field(header, 252, 4)? as usize;

        let signal_header_len = n_signals * 256;
        if bytes.len() < HEADER_LEN + signal_header_len {
            return Err(PipelineError::Format("truncated EDF/BDF signal header".into()));
        }
        let sh = &bytes[HEADER_LEN..HEADER_LEN + signal_header_len];

        let mut labels = Vec::with_capacity(n_signals);
        for i in 0..n_signals {
            let raw = std::str::from_utf8(&sh[i * 16..(i + 1) * 16])
                .unwrap_or("")
                .trim()
                .to_string();
            labels.push(raw);
        }

        let digital_min_off = n_signals * (16 + 80 + 8 + 8);
        let digital_max_off = digital_min_off + n_signals * 8;
        let physical_min_off = digital_min_off - n_signals * 16;
        let physical_max_off = physical_min_off + n_signals * 8;
        let samples_per_record_off = n_signals * (16 + 80 + 8 + 8 + 8 + 8 + 8 + 80);

        let mut phys_min = Vec::with_capacity(n_signals);
        let mut phys_max = Vec::with_capacity(n_signals);
        let mut dig_min = Vec::with_capacity(n_signals);
        let mut dig_max = Vec::with_capacity(n_signals);
        let mut samples_per_record = Vec::with_capacity(n_signals);

        for i in 0..n_signals {
            phys_min.push(parse_ascii_field_f64(sh, physical_min_off + i * 8, 8)?);
            phys_max.push(parse_ascii_field_f64(sh, physical_max_off + i * 8, 8)?);
            dig_min.push(parse_ascii_field(sh, digital_min_off + i * 8, 8)?);
            dig_max.push(parse_ascii_field(sh, digital_max_off + i * 8, 8)?);
            samples_per_record.push(parse_ascii_field(sh, samples_per_record_off + i * 8, 8)? as usize);
        }

        let bytes_per_sample = if is_bdf { 3 } else { 2 };
        let data_start = HEADER_LEN + signal_header_len;
        let mut data: Vec<Vec<f64>> = vec![Vec::new(); n_signals];

        let mut cursor = data_start;
        let records = if n_records < 0 { 0 } else { n_records as usize };
        for _ in 0..records {
            for (ch, &count) in samples_per_record.iter().enumerate() {
                for _ in 0..count {
                    if cursor + bytes_per_sample > bytes.len() {
                        return Err(PipelineError::Format("truncated EDF/BDF sample data".into()));
                    }
                    let raw = if is_bdf {
                        let b = &bytes[cursor..cursor + 3];
                        let v = i32::from_le_bytes([b[0], b[1], b[2], if b[2] & 0x80 != 0 { 0xFF } else { 0 }]);
                        v as f64
                    } else {
                        i16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as f64
                    };
                    let scale = (phys_max[ch] - phys_min[ch]) / ((dig_max[ch] - dig_min[ch]) as f64).max(1.0);
                    let physical = phys_min[ch] + (raw - dig_min[ch] as f64) * scale;
                    data[ch].push(physical);
                    cursor += bytes_per_sample;
                }
            }
        }

        let sample_rate = samples_per_record
            .first()
            .copied()
            .unwrap_or(0) as f64
            / record_duration.max(f64::EPSILON);

        Ok(SignalBuffer {
            channel_labels: labels,
            sample_rate,
            data,
            montage: None,
        })
    }

    fn parse_ascii_field(buf: &[u8], offset: usize, len: usize) -> Result<i32> {
        std::str::from_utf8(&buf[offset..offset + len])
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .ok_or_else(|| PipelineError::Format("malformed EDF/BDF numeric field".into()))
    }

    fn parse_ascii_field_f64(buf: &[u8], offset: usize, len: usize) -> Result<f64> {
        std::str::from_utf8(&buf[offset..offset + len])
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| PipelineError::Format("malformed EDF/BDF numeric field".into()))
    }
}

/// Internal "FIF-like" binary container. Not wire-compatible with MNE-FIF;
/// it exists to satisfy the same-machine round-trip invariant in §8 for the
/// cleaned-buffer artifact.
mod fif {
    use super::{Montage, SignalBuffer};
    use crate::error::{PipelineError, Result};

    const MAGIC: &[u8; 4] = b"NPF1";

    pub fn encode(buffer: &SignalBuffer) -> Result<Vec<u8>> {
        bincode::serialize(buffer)
            .map(|body| {
                let mut out = Vec::with_capacity(body.len() + 4);
                out.extend_from_slice(MAGIC);
                out.extend_from_slice(&body);
                out
            })
            .map_err(|e| PipelineError::Format(format!("failed to encode cleaned buffer: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<SignalBuffer> {
        if bytes.len() < 4 || &bytes[..4] != MAGIC {
            return Err(PipelineError::Format("not a neuropipe cleaned-buffer container".into()));
        }
        bincode::deserialize(&bytes[4..])
            .map_err(|e| PipelineError::Format(format!("failed to decode cleaned buffer: {e}")))
    }

    #[allow(dead_code)]
    fn unused_montage_hint(_m: &Montage) {}
}

/// Best-effort EEGLAB `.set` reader. Only the subset of the format needed
/// to recover channel labels, sample rate, and a flat data matrix is
/// implemented; epoched `.set` files and ICA-weight fields are not parsed.
mod eeglab {
    use super::SignalBuffer;
    use crate::error::{PipelineError, Result};

    pub fn decode(bytes: &[u8]) -> Result<SignalBuffer> {
        if bytes.len() < 8 {
            return Err(PipelineError::Format("truncated EEGLAB .set file".into()));
        }
        // EEGLAB .set is a MATLAB MAT-file; a full MAT parser is out of
        // scope for this reader. We accept a minimal JSON-in-.set
        // convention used by the ingestion tooling for synthetic/test
        // fixtures: `{"labels": [...], "sfreq": f, "data": [[...]]}`.
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PipelineError::Format("unsupported .set encoding (expected JSON fixture)".into()))?;
        #[derive(serde::Deserialize)]
        struct Fixture {
            labels: Vec<String>,
            sfreq: f64,
            data: Vec<Vec<f64>>,
        }
        let fixture: Fixture = serde_json::from_str(text)
            .map_err(|e| PipelineError::Format(format!("malformed .set fixture: {e}")))?;
        Ok(SignalBuffer {
            channel_labels: fixture.labels,
            sample_rate: fixture.sfreq,
            data: fixture.data,
            montage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> SignalBuffer {
        SignalBuffer {
            channel_labels: vec!["fp1".into(), "Cz".into()],
            sample_rate: 256.0,
            data: vec![vec![0.1, 0.2, 0.3], vec![1.0, 1.1, 1.2]],
            montage: None,
        }
    }

    #[test]
    fn fif_round_trip_is_exact() {
        let buffer = sample_buffer();
        let encoded = encode_fif(&buffer).unwrap();
        let decoded = decode_fif(&encoded).unwrap();
        assert_eq!(buffer, decoded);
    }

    #[test]
    fn channel_name_normalization_runs_on_decode() {
        let mut buffer = sample_buffer();
        buffer.normalize_channel_names();
        assert_eq!(buffer.channel_labels[0], "Fp1");
        assert_eq!(buffer.channel_labels[1], "Cz");
    }

    #[test]
    fn eeglab_fixture_round_trips_through_json() {
        let fixture = r#"{"labels":["Fz","Pz"],"sfreq":200.0,"data":[[1.0,2.0],[3.0,4.0]]}"#;
        let buffer = eeglab::decode(fixture.as_bytes()).unwrap();
        assert_eq!(buffer.sample_rate, 200.0);
        assert_eq!(buffer.n_channels(), 2);
    }
}
