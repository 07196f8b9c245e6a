//! Frame annotation and encoding for the telemetry tick.
//!
//! Draws detection boxes with `label: confidence` captions on the frame and
//! produces the base64 string carried in the outbound tick message.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sar_core::{Detection, Frame};
use tracing::trace;

use crate::{DetectorError, DetectorResult};

/// Annotates frames with detection overlays and encodes them for transport.
pub struct FrameEncoder {
    /// JPEG quality (0-100) used when OpenCV encoding is available.
    pub jpeg_quality: i32,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}

impl FrameEncoder {
    pub fn new(jpeg_quality: i32) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(0, 100),
        }
    }

    /// Draw detection overlays and return the frame as a base64 string.
    ///
    /// With the `opencv` feature the frame is annotated and JPEG-compressed;
    /// without it the raw buffer is encoded as-is so the pipeline stays
    /// exercisable end to end.
    pub fn annotate_and_encode(
        &self,
        frame: &Frame,
        detections: &[Detection],
    ) -> DetectorResult<String> {
        let expected = (frame.width * frame.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(DetectorError::InvalidFrame(format!(
                "buffer is {} bytes, expected {} for {}x{}",
                frame.data.len(),
                expected,
                frame.width,
                frame.height
            )));
        }

        trace!(
            "Encoding {}x{} frame with {} detections",
            frame.width,
            frame.height,
            detections.len()
        );

        self.encode_impl(frame, detections)
    }

    #[cfg(feature = "opencv")]
    fn encode_impl(&self, frame: &Frame, detections: &[Detection]) -> DetectorResult<String> {
        use opencv::{
            core::{Mat, Point, Rect, Scalar, Vector},
            imgcodecs, imgproc,
            prelude::*,
        };

        let flat = Mat::from_slice(&frame.data)?;
        let mut mat = flat
            .reshape(3, frame.height as i32)?
            .try_clone()
            .map_err(|e| DetectorError::encode(e.to_string()))?;

        let color = Scalar::new(0.0, 255.0, 0.0, 255.0);

        for detection in detections {
            let bbox = &detection.bbox;
            imgproc::rectangle(
                &mut mat,
                Rect::new(bbox.x1, bbox.y1, bbox.width(), bbox.height()),
                color,
                2,
                imgproc::LINE_AA,
                0,
            )?;

            let caption = format!("{}: {:.2}", detection.label, detection.confidence);
            imgproc::put_text(
                &mut mat,
                &caption,
                Point::new(bbox.x1, bbox.y1 - 10),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.9,
                color,
                2,
                imgproc::LINE_AA,
                false,
            )?;
        }

        let mut buffer = Vector::<u8>::new();
        let mut params = Vector::<i32>::new();
        params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
        params.push(self.jpeg_quality);
        imgcodecs::imencode(".jpg", &mat, &mut buffer, &params)?;

        Ok(BASE64.encode(buffer.as_slice()))
    }

    #[cfg(not(feature = "opencv"))]
    fn encode_impl(&self, frame: &Frame, _detections: &[Detection]) -> DetectorResult<String> {
        Ok(BASE64.encode(&frame.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::PixelBox;

    #[test]
    fn test_encode_produces_base64() {
        let encoder = FrameEncoder::default();
        let frame = Frame::blank(8, 8);
        let detections = vec![Detection::new("person", 0.9, PixelBox::new(1, 1, 4, 4))];

        let encoded = encoder.annotate_and_encode(&frame, &detections).unwrap();
        assert!(!encoded.is_empty());
        assert!(BASE64.decode(&encoded).is_ok());
    }

    #[test]
    fn test_encode_rejects_wrong_buffer_size() {
        let encoder = FrameEncoder::default();
        let frame = Frame::new(vec![0; 10], 8, 8);

        let result = encoder.annotate_and_encode(&frame, &[]);
        assert!(matches!(result, Err(DetectorError::InvalidFrame(_))));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameEncoder::new(250).jpeg_quality, 100);
        assert_eq!(FrameEncoder::new(-5).jpeg_quality, 0);
    }
}
