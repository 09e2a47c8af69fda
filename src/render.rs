use crate::detection::{Detection, DetectionResult};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStatistics {
    pub label: String,
    pub count: usize,
    pub average_confidence: f32,
}

/// Per-label counts and mean confidences, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStatistics {
    pub total: usize,
    pub labels: Vec<LabelStatistics>,
}

impl DetectionStatistics {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut sums: Vec<(&str, usize, f64)> = Vec::new();

        for detection in detections {
            match index.get(detection.label.as_str()) {
                Some(&i) => {
                    sums[i].1 += 1;
                    sums[i].2 += detection.confidence as f64;
                }
                None => {
                    index.insert(detection.label.as_str(), sums.len());
                    sums.push((detection.label.as_str(), 1, detection.confidence as f64));
                }
            }
        }

        let labels = sums
            .into_iter()
            .map(|(label, count, sum)| LabelStatistics {
                label: label.to_string(),
                count,
                average_confidence: (sum / count as f64) as f32,
            })
            .collect();

        Self {
            total: detections.len(),
            labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedResult {
    pub image_src: String,
    pub statistics: DetectionStatistics,
    pub detections: Vec<Detection>,
}

pub fn render_result(result: &DetectionResult) -> RenderedResult {
    RenderedResult {
        image_src: result.image.src(),
        statistics: DetectionStatistics::from_detections(&result.detections),
        detections: result.detections.clone(),
    }
}
