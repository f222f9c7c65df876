use crate::{
    config::InferenceConfig,
    media,
    models::{
        Classification, ClassificationModel, DepthAnything, DepthModel, OnnxClassifier,
        SegmentationModel, YoloSegmenter,
    },
    processing::{
        annotate::overlay_masks,
        depth::DepthMap,
        segmentation::Segment,
        volume::{VolumeAccumulator, box_ratio_fallback, round2, volume_score},
    },
    video::{FrameReader, FrameSink, FrameSource, FrameWriter, VideoTools},
};
use common::span;
use image::RgbImage;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// One entry of the `detections` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    /// Volume score, or the box-area fallback
    pub box_ratio: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub detections: Vec<DetectionSummary>,
    pub count: usize,
    /// `data:image/jpeg;base64,...` with masks drawn
    pub annotated_data: String,
    /// Magma depth heatmap, `null` without a depth model
    pub depth_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<Classification>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    /// One entry per class, volumes averaged over the sampled frames
    pub detections: Vec<DetectionSummary>,
    pub count: usize,
    /// `data:video/mp4;base64,...`
    pub annotated_data: String,
}

/// Response body of a prediction, tagged by media `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PredictionReport {
    Image(ImageReport),
    Video(VideoReport),
}

struct ServiceMetrics {
    duration: Histogram<f64>,
    predictions: Counter<u64>,
    detections: Counter<u64>,
    video_frames: Counter<u64>,
}

impl ServiceMetrics {
    fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ];

        Self {
            duration: meter
                .f64_histogram("prediction_duration_seconds")
                .with_description("Time to answer one prediction request")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            predictions: meter
                .u64_counter("predictions_total")
                .with_description("Predictions served")
                .build(),
            detections: meter
                .u64_counter("prediction_detections_total")
                .with_description("Detections returned to clients")
                .build(),
            video_frames: meter
                .u64_counter("video_frames_total")
                .with_description("Video frames segmented")
                .build(),
        }
    }

    fn record(&self, media: &'static str, started: Instant, detections: usize) {
        let attributes = [KeyValue::new("media", media)];
        self.duration
            .record(started.elapsed().as_secs_f64(), &attributes);
        self.predictions.add(1, &attributes);
        self.detections.add(detections as u64, &attributes);
    }
}

/// Segmentation, depth and optional classification over uploaded media.
pub struct PredictionService {
    segmenter: Box<dyn SegmentationModel>,
    depth: Option<Box<dyn DepthModel>>,
    classifier: Option<Box<dyn ClassificationModel>>,
    tools: VideoTools,
    config: InferenceConfig,
    metrics: ServiceMetrics,
}

impl PredictionService {
    pub fn new(
        segmenter: Box<dyn SegmentationModel>,
        depth: Option<Box<dyn DepthModel>>,
        classifier: Option<Box<dyn ClassificationModel>>,
        config: InferenceConfig,
    ) -> Self {
        Self {
            segmenter,
            depth,
            classifier,
            tools: VideoTools::new(&config.ffmpeg_path, &config.ffprobe_path),
            config,
            metrics: ServiceMetrics::new("inference"),
        }
    }

    /// Load every configured ONNX model.
    pub fn load(config: InferenceConfig) -> anyhow::Result<Self> {
        let _s = span!("load_models");
        let started = Instant::now();

        let segmenter = YoloSegmenter::load(&config)?;

        let depth = match config.depth_model_path.as_deref() {
            Some(path) => Some(Box::new(DepthAnything::load(path, &config)?) as Box<dyn DepthModel>),
            None => {
                tracing::warn!("Depth model disabled; volumes fall back to box area");
                None
            }
        };

        let classifier = match config.classifier_model_path.as_deref() {
            Some(path) => Some(
                Box::new(OnnxClassifier::load(path, &config)?) as Box<dyn ClassificationModel>,
            ),
            None => None,
        };

        tracing::info!(
            depth = depth.is_some(),
            classifier = classifier.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Models loaded"
        );

        Ok(Self::new(Box::new(segmenter), depth, classifier, config))
    }

    pub fn process_image(&mut self, bytes: &[u8]) -> anyhow::Result<ImageReport> {
        let _s = span!("process_image", bytes = bytes.len());
        let started = Instant::now();

        let mut image = media::decode_image(bytes)?;
        let (width, height) = image.dimensions();

        let depth = match self.depth.as_mut() {
            Some(model) => Some(model.estimate(&image)?),
            None => None,
        };
        let depth_data = depth
            .as_ref()
            .map(|map| media::jpeg_data_url(&map.colorize(), self.config.jpeg_quality))
            .transpose()?;

        let segments = self.segmenter.segment(&image)?;

        let detections: Vec<DetectionSummary> = segments
            .iter()
            .map(|segment| {
                let volume = segment
                    .mask
                    .as_ref()
                    .map_or(0.0, |mask| volume_score(mask, depth.as_ref()));
                let box_ratio = if volume == 0.0 {
                    box_ratio_fallback(&segment.bbox, width, height)
                } else {
                    volume
                };

                DetectionSummary {
                    class_name: self.segmenter.class_name(segment.class_id).into_owned(),
                    confidence: round2(segment.confidence),
                    box_ratio,
                }
            })
            .collect();

        let classifications = match self.classifier.as_mut() {
            Some(model) => Some(model.classify(&image, self.config.classifier_top_k)?),
            None => None,
        };

        overlay_masks(&mut image, &segments);
        let annotated_data = media::jpeg_data_url(&image, self.config.jpeg_quality)?;

        self.metrics.record("image", started, detections.len());
        tracing::info!(
            width,
            height,
            detections = detections.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image processed"
        );

        Ok(ImageReport {
            count: detections.len(),
            detections,
            annotated_data,
            depth_data,
            classifications,
        })
    }

    pub fn process_video(&mut self, path: &Path) -> anyhow::Result<VideoReport> {
        let _s = span!("process_video");
        let started = Instant::now();

        let info = self.tools.probe(path)?;
        let codec = self.tools.select_codec();
        tracing::info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            ?codec,
            "Processing video"
        );

        let output = tempfile::Builder::new()
            .prefix("annotated-")
            .suffix(".mp4")
            .tempfile()?;

        let mut source = FrameSource::open(&self.tools, path, info)?;
        let mut sink = FrameSink::create(&self.tools, output.path(), info, codec)?;
        let volumes = self.run_frames(&mut source, &mut sink);
        drop(source);

        let frames = sink.finish()?;
        let encoded = std::fs::read(output.path())?;
        let report = video_report(&volumes, &encoded);

        self.metrics.record("video", started, report.count);
        tracing::info!(
            frames,
            classes = report.count,
            output_bytes = encoded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Video processed"
        );

        Ok(report)
    }

    /// Annotate frames until the reader is exhausted or a frame fails.
    /// Volumes sampled before a failure are kept.
    fn run_frames(
        &mut self,
        source: &mut dyn FrameReader,
        sink: &mut dyn FrameWriter,
    ) -> VolumeAccumulator {
        let mut volumes = VolumeAccumulator::default();
        let mut frame_index = 0u64;

        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, frame_index, "Video decode failed, stopping");
                    break;
                }
            };

            let written = self
                .annotate_frame(frame, frame_index, &mut volumes)
                .and_then(|annotated| Ok(sink.write(&annotated)?));
            if let Err(e) = written {
                tracing::error!(error = %e, frame_index, "Video processing failed, stopping");
                break;
            }

            frame_index += 1;
            self.metrics.video_frames.add(1, &[]);
        }

        if volumes.is_empty() {
            tracing::warn!(frames = frame_index, "No masked detections on sampled frames");
        }
        volumes
    }

    /// Segment one frame, sample volumes on depth frames, and draw the masks.
    fn annotate_frame(
        &mut self,
        mut frame: RgbImage,
        frame_index: u64,
        volumes: &mut VolumeAccumulator,
    ) -> anyhow::Result<RgbImage> {
        let segments = self.segmenter.segment(&frame)?;

        if frame_index % self.config.depth_frame_stride == 0 {
            let depth = match self.depth.as_mut() {
                Some(model) => Some(model.estimate(&frame)?),
                None => None,
            };
            self.record_volumes(&segments, depth.as_ref(), volumes);
        }

        overlay_masks(&mut frame, &segments);
        Ok(frame)
    }

    fn record_volumes(
        &self,
        segments: &[Segment],
        depth: Option<&DepthMap>,
        volumes: &mut VolumeAccumulator,
    ) {
        for segment in segments {
            let Some(mask) = &segment.mask else {
                continue;
            };
            let name = self.segmenter.class_name(segment.class_id);
            volumes.record(&name, volume_score(mask, depth), segment.confidence);
        }
    }
}

/// One summary per class: mean volume as `box_ratio`, mean confidence.
fn video_report(volumes: &VolumeAccumulator, encoded: &[u8]) -> VideoReport {
    let detections: Vec<DetectionSummary> = volumes
        .averages()
        .into_iter()
        .map(|average| DetectionSummary {
            class_name: average.name,
            confidence: average.mean_confidence,
            box_ratio: average.mean_volume,
        })
        .collect();

    VideoReport {
        count: detections.len(),
        detections,
        annotated_data: media::data_url("video/mp4", encoded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::segmentation::{BBox, Mask};
    use crate::video::VideoError;
    use ndarray::Array2;
    use std::borrow::Cow;
    use std::io::Cursor;

    struct FakeSegmenter {
        segments: Vec<Segment>,
    }

    impl SegmentationModel for FakeSegmenter {
        fn segment(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Segment>> {
            Ok(self.segments.clone())
        }

        fn class_name(&self, class_id: usize) -> Cow<'_, str> {
            Cow::Owned(format!("food_{}", class_id))
        }
    }

    struct ConstantDepth(f32);

    impl DepthModel for ConstantDepth {
        fn estimate(&mut self, image: &RgbImage) -> anyhow::Result<DepthMap> {
            let (w, h) = image.dimensions();
            Ok(DepthMap::new(Array2::from_elem(
                (h as usize, w as usize),
                self.0,
            )))
        }
    }

    struct FakeClassifier;

    impl ClassificationModel for FakeClassifier {
        fn classify(
            &mut self,
            _image: &RgbImage,
            top_k: usize,
        ) -> anyhow::Result<Vec<Classification>> {
            Ok(vec![
                Classification { label: "pho".into(), confidence: 0.8 },
                Classification { label: "bun".into(), confidence: 0.2 },
            ]
            .into_iter()
            .take(top_k)
            .collect())
        }
    }

    /// Yields blank frames, failing at `fail_at` if set.
    struct ScriptedFrames {
        next: u64,
        total: u64,
        fail_at: Option<u64>,
    }

    impl FrameReader for ScriptedFrames {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
            if self.fail_at == Some(self.next) {
                return Err(VideoError::Io(std::io::Error::other("corrupt packet")));
            }
            if self.next == self.total {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(RgbImage::new(64, 64)))
        }
    }

    #[derive(Default)]
    struct CollectedFrames {
        written: usize,
        capacity: Option<usize>,
    }

    impl FrameWriter for CollectedFrames {
        fn write(&mut self, _frame: &RgbImage) -> Result<(), VideoError> {
            if self.capacity == Some(self.written) {
                return Err(VideoError::EncodeFailed("broken pipe".into()));
            }
            self.written += 1;
            Ok(())
        }
    }

    fn masked_segment(class_id: usize, confidence: f32) -> Segment {
        Segment {
            class_id,
            confidence,
            bbox: BBox { x1: 0.0, y1: 0.0, x2: 50.0, y2: 50.0 },
            mask: Some(Mask {
                x0: 0,
                y0: 0,
                data: Array2::from_elem((50, 50), true),
            }),
        }
    }

    fn unmasked_segment(class_id: usize) -> Segment {
        Segment {
            class_id,
            confidence: 0.456,
            bbox: BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 },
            mask: None,
        }
    }

    fn service(
        segments: Vec<Segment>,
        depth: Option<f32>,
        classifier: bool,
    ) -> PredictionService {
        PredictionService::new(
            Box::new(FakeSegmenter { segments }),
            depth.map(|d| Box::new(ConstantDepth(d)) as Box<dyn DepthModel>),
            classifier.then(|| Box::new(FakeClassifier) as Box<dyn ClassificationModel>),
            InferenceConfig::default(),
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90]))
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_image_volume_from_depth() {
        // 2500 px * depth 40 / 50000 = 2.0
        let mut service = service(vec![masked_segment(3, 0.876)], Some(40.0), false);
        let report = service.process_image(&png(100, 100)).unwrap();

        assert_eq!(report.count, 1);
        assert_eq!(
            report.detections[0],
            DetectionSummary {
                class_name: "food_3".into(),
                confidence: 0.88,
                box_ratio: 2.0,
            }
        );
        assert!(report.annotated_data.starts_with("data:image/jpeg;base64,"));
        assert!(report.depth_data.unwrap().starts_with("data:image/jpeg;base64,"));
        assert!(report.classifications.is_none());
    }

    #[test]
    fn test_image_falls_back_to_box_ratio() {
        // No depth model: 10x10 box over 100x50 image -> 100 / 5000 * 10 = 0.2
        let mut service = service(vec![unmasked_segment(0), masked_segment(1, 0.5)], None, false);
        let report = service.process_image(&png(100, 50)).unwrap();

        assert_eq!(report.count, 2);
        assert!((report.detections[0].box_ratio - 0.2).abs() < 1e-6);
        assert_eq!(report.detections[0].confidence, 0.46);
        // 50x50 box clipped by nothing: 2500 / 5000 * 10 = 5
        assert!((report.detections[1].box_ratio - 5.0).abs() < 1e-6);
        assert!(report.depth_data.is_none());
    }

    #[test]
    fn test_image_with_classifier() {
        let mut service = service(Vec::new(), Some(1.0), true);
        let report = service.process_image(&png(32, 32)).unwrap();

        assert_eq!(report.count, 0);
        let classes = report.classifications.unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].label, "pho");
    }

    #[test]
    fn test_undecodable_image_is_media_error() {
        let mut service = service(Vec::new(), None, false);
        let err = service.process_image(b"not an image").unwrap_err();
        assert!(err.downcast_ref::<media::MediaError>().is_some());
    }

    #[test]
    fn test_depth_sampled_on_stride_frames_only() {
        let mut service = service(vec![masked_segment(2, 0.7)], Some(20.0), false);
        let mut volumes = VolumeAccumulator::default();

        for index in 0..31 {
            let frame = RgbImage::new(64, 64);
            let annotated = service.annotate_frame(frame, index, &mut volumes).unwrap();
            assert_eq!(annotated.dimensions(), (64, 64));
        }

        // Frames 0, 15 and 30; 2500 * 20 / 50000 = 1.0
        let averages = volumes.averages();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].name, "food_2");
        assert_eq!(averages[0].samples, 3);
        assert_eq!(averages[0].mean_volume, 1.0);
        assert_eq!(averages[0].mean_confidence, 0.7);
    }

    #[test]
    fn test_video_frames_without_depth_record_zero_volume() {
        let mut service = service(vec![masked_segment(0, 0.9), unmasked_segment(1)], None, false);
        let mut volumes = VolumeAccumulator::default();

        service
            .annotate_frame(RgbImage::new(64, 64), 0, &mut volumes)
            .unwrap();

        let averages = volumes.averages();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].mean_volume, 0.0);
    }

    #[test]
    fn test_video_decode_error_keeps_collected_volumes() {
        let mut service = service(vec![masked_segment(2, 0.7)], Some(20.0), false);
        let mut source = ScriptedFrames { next: 0, total: 40, fail_at: Some(20) };
        let mut sink = CollectedFrames::default();

        let volumes = service.run_frames(&mut source, &mut sink);

        assert_eq!(sink.written, 20);
        // Depth frames 0 and 15 were sampled before the failure
        let averages = volumes.averages();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].samples, 2);

        let report = video_report(&volumes, b"mp4");
        assert_eq!(report.count, 1);
        assert_eq!(
            report.detections,
            vec![DetectionSummary {
                class_name: "food_2".into(),
                confidence: 0.7,
                box_ratio: 1.0,
            }]
        );
        assert_eq!(report.annotated_data, "data:video/mp4;base64,bXA0");
    }

    #[test]
    fn test_video_encoder_error_stops_processing() {
        let mut service = service(vec![masked_segment(0, 0.9)], Some(10.0), false);
        let mut source = ScriptedFrames { next: 0, total: 40, fail_at: None };
        let mut sink = CollectedFrames { written: 0, capacity: Some(3) };

        let volumes = service.run_frames(&mut source, &mut sink);

        assert_eq!(sink.written, 3);
        // Fourth frame was read, annotated, then rejected by the encoder
        assert_eq!(source.next, 4);
        let averages = volumes.averages();
        assert_eq!(averages[0].samples, 1);
        assert_eq!(averages[0].mean_volume, 0.5);
    }

    #[test]
    fn test_video_without_detections_reports_empty() {
        let mut service = service(Vec::new(), Some(10.0), false);
        let mut source = ScriptedFrames { next: 0, total: 5, fail_at: None };
        let mut sink = CollectedFrames::default();

        let volumes = service.run_frames(&mut source, &mut sink);
        let report = video_report(&volumes, &[]);

        assert_eq!(sink.written, 5);
        assert_eq!(report.count, 0);
        assert!(report.detections.is_empty());
        assert_eq!(report.annotated_data, "data:video/mp4;base64,");
    }

    #[test]
    fn test_report_serialization() {
        let report = PredictionReport::Image(ImageReport {
            detections: vec![DetectionSummary {
                class_name: "rice".into(),
                confidence: 0.91,
                box_ratio: 1.5,
            }],
            count: 1,
            annotated_data: "data:image/jpeg;base64,AAAA".into(),
            depth_data: None,
            classifications: None,
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["detections"][0]["class"], "rice");
        assert_eq!(json["count"], 1);
        assert!(json["depth_data"].is_null());
        assert!(json.get("classifications").is_none());

        let video = PredictionReport::Video(VideoReport {
            detections: Vec::new(),
            count: 0,
            annotated_data: "data:video/mp4;base64,".into(),
        });
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["type"], "video");
        assert!(json.get("depth_data").is_none());
    }
}
