//! Evaluation-artifact rendering (§4.11): confusion matrix, ROC curve and
//! (random-forest only) feature-importance bar chart, as PNG bytes ready
//! for `ObjectStore::put_bytes`.

use crate::error::{PipelineError, Result};
use plotters::prelude::*;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Renders through a throwaway PNG file rather than an in-memory bitmap:
/// `plotters`' bitmap backend only gained an in-memory PNG encoder in
/// later releases, but writing to a path is supported everywhere.
fn render<F>(draw: F) -> Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend, plotters::coord::Shift>) -> Result<()>,
{
    let path = std::env::temp_dir().join(format!("neuropipe-plot-{}.png", uuid::Uuid::new_v4()));
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

pub fn confusion_matrix_png(matrix: &[Vec<usize>], class_labels: &[String]) -> Result<Vec<u8>> {
    let n = matrix.len();
    let max_count = matrix.iter().flatten().cloned().max().unwrap_or(1).max(1);

    render(|area| {
        let mut chart = ChartBuilder::on(area)
            .caption("Confusion matrix", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(30)
            .build_cartesian_2d(0..n, 0..n)
            .map_err(|e| PipelineError::Model(format!("failed to build confusion matrix chart: {e}")))?;

        chart
            .configure_mesh()
            .x_labels(n)
            .y_labels(n)
            .x_label_formatter(&|i| class_labels.get(*i).cloned().unwrap_or_default())
            .y_label_formatter(&|i| class_labels.get(*i).cloned().unwrap_or_default())
            .draw()
            .map_err(|e| PipelineError::Model(format!("failed to draw confusion matrix mesh: {e}")))?;

        for (row_idx, row) in matrix.iter().enumerate() {
            for (col_idx, &count) in row.iter().enumerate() {
                let intensity = (count as f64 / max_count as f64 * 255.0) as u8;
                let color = RGBColor(255 - intensity, 255 - intensity, 255);
                chart
                    .draw_series(std::iter::once(Rectangle::new(
                        [(col_idx, row_idx), (col_idx + 1, row_idx + 1)],
                        color.filled(),
                    )))
                    .map_err(|e| PipelineError::Model(format!("failed to draw confusion matrix cell: {e}")))?;
            }
        }
        Ok(())
    })
}

pub fn roc_curve_png(points: &[(f64, f64)]) -> Result<Vec<u8>> {
    render(|area| {
        let mut chart = ChartBuilder::on(area)
            .caption("ROC curve", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(30)
            .build_cartesian_2d(0.0..1.0, 0.0..1.0)
            .map_err(|e| PipelineError::Model(format!("failed to build ROC chart: {e}")))?;

        chart
            .configure_mesh()
            .x_desc("False positive rate")
            .y_desc("True positive rate")
            .draw()
            .map_err(|e| PipelineError::Model(format!("failed to draw ROC mesh: {e}")))?;

        chart
            .draw_series(LineSeries::new(points.iter().cloned(), &BLUE))
            .map_err(|e| PipelineError::Model(format!("failed to draw ROC curve: {e}")))?;
        chart
            .draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], &BLACK.mix(0.4)))
            .map_err(|e| PipelineError::Model(format!("failed to draw ROC diagonal: {e}")))?;
        Ok(())
    })
}

pub fn feature_importance_png(feature_names: &[String], importances: &[f64]) -> Result<Vec<u8>> {
    let max_importance = importances.iter().cloned().fold(0.0_f64, f64::max).max(1e-9);
    let n = importances.len();

    render(|area| {
        let mut chart = ChartBuilder::on(area)
            .caption("Feature importances", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(80)
            .build_cartesian_2d(0.0..(max_importance * 1.1), 0..n)
            .map_err(|e| PipelineError::Model(format!("failed to build feature importance chart: {e}")))?;

        chart
            .configure_mesh()
            .y_labels(n)
            .y_label_formatter(&|i| feature_names.get(*i).cloned().unwrap_or_default())
            .draw()
            .map_err(|e| PipelineError::Model(format!("failed to draw feature importance mesh: {e}")))?;

        chart
            .draw_series(importances.iter().enumerate().map(|(i, &v)| {
                Rectangle::new([(0.0, i), (v, i + 1)], BLUE.filled())
            }))
            .map_err(|e| PipelineError::Model(format!("failed to draw feature importance bars: {e}")))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_matrix_renders_nonempty_png() {
        let matrix = vec![vec![5, 1], vec![2, 8]];
        let labels = vec!["rest".to_string(), "active".to_string()];
        let bytes = confusion_matrix_png(&matrix, &labels).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn roc_curve_renders_nonempty_png() {
        let points = vec![(0.0, 0.0), (0.2, 0.6), (1.0, 1.0)];
        let bytes = roc_curve_png(&points).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn feature_importance_renders_nonempty_png() {
        let names = vec!["band_alpha".to_string(), "hjorth_mobility".to_string()];
        let importances = vec![0.6, 0.4];
        let bytes = feature_importance_png(&names, &importances).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
