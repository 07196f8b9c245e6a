//! YOLO-backed detector using OpenCV's DNN module.
//!
//! Loads an ONNX export of a YOLO model and decodes its `[1, 4+C, N]` output
//! tensor into labeled boxes, with non-maximum suppression at the configured
//! IoU threshold. Only compiled with the `opencv` feature.

use opencv::{
    core::{CV_32F, Mat, Rect2d, Scalar, Size, Vector},
    dnn,
    prelude::*,
};
use parking_lot::Mutex;
use sar_core::{Detection, Frame, PixelBox};
use tracing::{debug, info};

use crate::{DetectorConfig, DetectorError, DetectorResult, ObjectDetector, sanitize};

/// Model input side length (square letterbox).
const INPUT_SIZE: i32 = 640;

/// Object detector backed by a YOLO ONNX model.
pub struct YoloDetector {
    config: DetectorConfig,
    /// DNN inference is stateful in OpenCV; serialize access.
    net: Mutex<dnn::Net>,
    class_names: Vec<String>,
}

impl YoloDetector {
    /// Load the model from an ONNX file plus its class-name list
    /// (one label per line).
    pub fn new(
        config: DetectorConfig,
        model_path: &str,
        class_names: Vec<String>,
    ) -> DetectorResult<Self> {
        info!("Loading YOLO model from {}", model_path);

        let net = dnn::read_net_from_onnx(model_path)
            .map_err(|e| DetectorError::ModelLoad(e.to_string()))?;

        info!("YOLO model loaded ({} classes)", class_names.len());

        Ok(Self {
            config,
            net: Mutex::new(net),
            class_names,
        })
    }

    fn frame_to_mat(frame: &Frame) -> DetectorResult<Mat> {
        let flat = Mat::from_slice(&frame.data)?;
        Ok(flat.reshape(3, frame.height as i32)?.try_clone()?)
    }

    /// Decode one `[1, 4+C, N]` output tensor into raw detections in frame
    /// pixel coordinates.
    fn decode(&self, output: &Mat, frame: &Frame) -> DetectorResult<Vec<Detection>> {
        let rows = output.mat_size();
        // [1, attrs, anchors] -> transpose to iterate anchors.
        let attrs = rows.get(1).copied().unwrap_or(0);
        let anchors = rows.get(2).copied().unwrap_or(0);
        if attrs < 5 || anchors == 0 {
            return Err(DetectorError::inference(format!(
                "unexpected output shape {:?}",
                rows
            )));
        }

        let reshaped = output.reshape(1, attrs)?;
        let mut transposed = Mat::default();
        opencv::core::transpose(&reshaped, &mut transposed)?;

        let scale_x = frame.width as f64 / INPUT_SIZE as f64;
        let scale_y = frame.height as f64 / INPUT_SIZE as f64;

        let mut boxes = Vector::<Rect2d>::new();
        let mut scores = Vector::<f32>::new();
        let mut class_ids = Vec::new();

        for row in 0..transposed.rows() {
            let mut best_class = 0usize;
            let mut best_score = 0f32;
            for class in 0..(attrs - 4) as usize {
                let score = *transposed.at_2d::<f32>(row, 4 + class as i32)?;
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }

            if (best_score as f64) < self.config.confidence_threshold {
                continue;
            }

            let cx = *transposed.at_2d::<f32>(row, 0)? as f64 * scale_x;
            let cy = *transposed.at_2d::<f32>(row, 1)? as f64 * scale_y;
            let w = *transposed.at_2d::<f32>(row, 2)? as f64 * scale_x;
            let h = *transposed.at_2d::<f32>(row, 3)? as f64 * scale_y;

            boxes.push(Rect2d::new(cx - w / 2.0, cy - h / 2.0, w, h));
            scores.push(best_score);
            class_ids.push(best_class);
        }

        let mut kept = Vector::<i32>::new();
        dnn::nms_boxes_f64(
            &boxes,
            &scores,
            self.config.confidence_threshold as f32,
            self.config.iou_threshold as f32,
            &mut kept,
            1.0,
            0,
        )?;

        let mut detections = Vec::with_capacity(kept.len());
        for idx in kept.iter() {
            let rect = boxes.get(idx as usize)?;
            let label = self
                .class_names
                .get(class_ids[idx as usize])
                .cloned()
                .unwrap_or_else(|| format!("class-{}", class_ids[idx as usize]));

            detections.push(Detection::new(
                label,
                scores.get(idx as usize)? as f64,
                PixelBox::new(
                    rect.x as i32,
                    rect.y as i32,
                    (rect.x + rect.width) as i32,
                    (rect.y + rect.height) as i32,
                ),
            ));
        }

        Ok(detections)
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, frame: &Frame) -> DetectorResult<Vec<Detection>> {
        let mat = Self::frame_to_mat(frame)?;

        let blob = dnn::blob_from_image(
            &mat,
            1.0 / 255.0,
            Size::new(INPUT_SIZE, INPUT_SIZE),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;

        let raw = {
            let mut net = self.net.lock();
            net.set_input(&blob, "", 1.0, Scalar::default())?;
            let mut outputs = Vector::<Mat>::new();
            let names = net.get_unconnected_out_layers_names()?;
            net.forward(&mut outputs, &names)?;
            outputs
                .get(0)
                .map_err(|e| DetectorError::inference(e.to_string()))?
        };

        let decoded = self.decode(&raw, frame)?;
        debug!("YOLO produced {} raw detections", decoded.len());

        Ok(sanitize(decoded, &self.config))
    }
}
