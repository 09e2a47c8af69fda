use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ResponseFormatError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// The image sent back by the inference service, with the boxes drawn on it.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedImage {
    Url(String),
    Inline { mime_type: String, data: Bytes },
}

impl AnnotatedImage {
    /// Value usable as an `<img src>`.
    pub fn src(&self) -> String {
        match self {
            AnnotatedImage::Url(url) => url.clone(),
            AnnotatedImage::Inline { mime_type, data } => {
                format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub image: AnnotatedImage,
    pub detections: Vec<Detection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    image_url: Option<String>,
    image: Option<String>,
    image_data: Option<String>,
    detections: Option<Vec<WireDetection>>,
}

#[derive(Deserialize)]
struct WireDetection {
    label: String,
    confidence: f32,
    #[serde(flatten)]
    bbox: WireBox,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireBox {
    Size {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Corners {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

impl From<WireBox> for BoundingBox {
    fn from(wire: WireBox) -> Self {
        match wire {
            WireBox::Size {
                x,
                y,
                width,
                height,
            } => BoundingBox {
                x,
                y,
                width,
                height,
            },
            WireBox::Corners { x1, y1, x2, y2 } => BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            },
        }
    }
}

impl DetectionResult {
    pub fn from_json(body: &[u8]) -> Result<Self, ResponseFormatError> {
        let wire: WireResponse = serde_json::from_slice(body)
            .map_err(|e| ResponseFormatError(format!("invalid detection payload: {}", e)))?;

        let image = match (wire.image_url, wire.image.or(wire.image_data)) {
            (Some(url), _) => AnnotatedImage::Url(url),
            (None, Some(encoded)) => decode_inline_image(&encoded)?,
            (None, None) => {
                return Err(ResponseFormatError(
                    "response carries neither `imageUrl` nor `image`/`imageData`".into(),
                ))
            }
        };

        let detections = wire
            .detections
            .ok_or_else(|| ResponseFormatError("response has no `detections` array".into()))?
            .into_iter()
            .map(|d| {
                if !(0.0..=1.0).contains(&d.confidence) {
                    return Err(ResponseFormatError(format!(
                        "confidence {} for `{}` is outside [0, 1]",
                        d.confidence, d.label
                    )));
                }
                Ok(Detection {
                    label: d.label,
                    confidence: d.confidence,
                    bounding_box: d.bbox.into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { image, detections })
    }
}

fn decode_inline_image(encoded: &str) -> Result<AnnotatedImage, ResponseFormatError> {
    let (declared_mime, payload) = match encoded.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| ResponseFormatError("malformed data URL".into()))?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                ResponseFormatError("inline image data URL is not base64 encoded".into())
            })?;
            (Some(mime.to_string()), payload)
        }
        None => (None, encoded),
    };

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| ResponseFormatError(format!("invalid base64 image: {}", e)))?;
    let mime_type = declared_mime.unwrap_or_else(|| sniff_image_mime(&data).to_string());

    Ok(AnnotatedImage::Inline {
        mime_type,
        data: Bytes::from(data),
    })
}

fn sniff_image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
