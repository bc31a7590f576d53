//! Preprocessing visualization artifacts (§4.11): per-channel PSD and a
//! bad-channel overlay, rendered the same way the trainer renders its
//! evaluation plots - through a throwaway PNG file, since `plotters`'
//! bitmap backend gained an in-memory encoder only in later releases.

use crate::error::{PipelineError, Result};
use crate::signal::SignalBuffer;
use plotters::prelude::*;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn render<F>(draw: F) -> Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend, plotters::coord::Shift>) -> Result<()>,
{
    let path = std::env::temp_dir().join(format!("neuropipe-viz-{}.png", uuid::Uuid::new_v4()));
    {
        let backend = BitMapBackend::new(&path, (WIDTH, HEIGHT));
        let area = backend.into_drawing_area();
        area.fill(&WHITE).map_err(|e| PipelineError::Model(format!("failed to fill plot background: {e}")))?;
        draw(&area)?;
        area.present().map_err(|e| PipelineError::Model(format!("failed to present plot: {e}")))?;
    }
    let bytes = std::fs::read(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(bytes)
}

/// One Welch PSD curve per channel, overlaid on a single log-power axis.
pub fn psd_png(buffer: &SignalBuffer, title: &str) -> Result<Vec<u8>> {
    let curves: Vec<(String, crate::features::PsdEstimate)> = buffer
        .channel_labels
        .iter()
        .zip(buffer.data.iter())
        .map(|(label, channel)| (label.clone(), crate::features::welch_psd(channel, buffer.sample_rate, 2.0)))
        .collect();

    let max_power = curves
        .iter()
        .flat_map(|(_, psd)| psd.power.iter().cloned())
        .fold(1e-12_f64, f64::max);
    let max_freq = buffer.sample_rate / 2.0;

    render(|area| {
        let mut chart = ChartBuilder::on(area)
            .caption(title, ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0.0..max_freq, 0.0..(max_power * 1.1))
            .map_err(|e| PipelineError::Model(format!("failed to build PSD chart: {e}")))?;

        chart
            .configure_mesh()
            .x_desc("Frequency (Hz)")
            .y_desc("Power")
            .draw()
            .map_err(|e| PipelineError::Model(format!("failed to draw PSD mesh: {e}")))?;

        for (idx, (_, psd)) in curves.iter().enumerate() {
            let color = Palette99::pick(idx);
            chart
                .draw_series(LineSeries::new(
                    psd.freqs.iter().zip(psd.power.iter()).map(|(&f, &p)| (f, p)),
                    &color,
                ))
                .map_err(|e| PipelineError::Model(format!("failed to draw PSD curve: {e}")))?;
        }
        Ok(())
    })
}

/// Per-channel variance bar chart with bad channels highlighted, standing
/// in for a spatial bad-channel overlay without a head-montage renderer.
pub fn bad_channel_overlay_png(channel_labels: &[String], data: &[Vec<f64>], bad_channels: &[String]) -> Result<Vec<u8>> {
    let variances: Vec<f64> = data
        .iter()
        .map(|channel| {
            let n = channel.len().max(1) as f64;
            let mean = channel.iter().sum::<f64>() / n;
            channel.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
        })
        .collect();
    let max_variance = variances.iter().cloned().fold(1e-12_f64, f64::max);
    let n = channel_labels.len();

    render(|area| {
        let mut chart = ChartBuilder::on(area)
            .caption("Channel variance (bad channels in red)", ("sans-serif", 18))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(40)
            .build_cartesian_2d(0..n, 0.0..(max_variance * 1.1))
            .map_err(|e| PipelineError::Model(format!("failed to build bad-channel chart: {e}")))?;

        chart
            .configure_mesh()
            .x_label_formatter(&|i| channel_labels.get(*i).cloned().unwrap_or_default())
            .y_desc("Variance")
            .draw()
            .map_err(|e| PipelineError::Model(format!("failed to draw bad-channel mesh: {e}")))?;

        chart
            .draw_series(variances.iter().enumerate().map(|(i, &v)| {
                let is_bad = channel_labels.get(i).map(|l| bad_channels.contains(l)).unwrap_or(false);
                let color = if is_bad { RED } else { BLUE };
                Rectangle::new([(i, 0.0), (i + 1, v)], color.filled())
            }))
            .map_err(|e| PipelineError::Model(format!("failed to draw bad-channel bars: {e}")))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> SignalBuffer {
        let sfreq = 128.0;
        let n = 512;
        SignalBuffer {
            channel_labels: vec!["Fz".into(), "Pz".into()],
            sample_rate: sfreq,
            data: vec![
                (0..n).map(|i| (i as f64 / sfreq * 10.0).sin()).collect(),
                (0..n).map(|i| (i as f64 / sfreq * 20.0).sin()).collect(),
            ],
            montage: None,
        }
    }

    #[test]
    fn psd_plot_renders_nonempty_png() {
        let buffer = sample_buffer();
        let bytes = psd_png(&buffer, "psd_after").unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn bad_channel_overlay_renders_nonempty_png() {
        let buffer = sample_buffer();
        let bytes = bad_channel_overlay_png(&buffer.channel_labels, &buffer.data, &["Fz".to_string()]).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
