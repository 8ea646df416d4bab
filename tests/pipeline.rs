//! Run the analysis loop end to end against the mock camera

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::thread;
use std::time::Duration;

use stereo_diag::mock::MockCamera;
use stereo_diag::pipeline::{
    StopHandle, LEFT_BLOB_VIEW, LEFT_GRAY_VIEW, MOTION_VIEW, RIGHT_BLOB_VIEW, RIGHT_GRAY_VIEW,
};
use stereo_diag::prelude::*;
use stereo_diag::source::{CameraPairSource, ChannelPairSource};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const VIEW_WIDTH: usize = 64;
const VIEW_HEIGHT: usize = 48;
const SHIFT: usize = 4;

// -----------------------------------------------------------------------------------------------
// HELPERS
// -----------------------------------------------------------------------------------------------

/// Records what it was shown and stops the loop after a fixed number of cycles.
struct Recorder {
    views: Vec<String>,
    blob_counts: Vec<usize>,
    disparity_maps: usize,
    stop_after: usize,
    stop: Option<StopHandle>,
}

impl Recorder {
    fn new(stop_after: usize) -> Self {
        Self {
            views: Vec::new(),
            blob_counts: Vec::new(),
            disparity_maps: 0,
            stop_after,
            stop: None,
        }
    }
}

impl Presenter for Recorder {
    fn show(&mut self, name: &str, _image: &Frame) {
        self.views.push(name.to_string());
    }

    fn show_disparity(&mut self, _map: &DisparityMap) {
        self.disparity_maps += 1;
        if self.disparity_maps >= self.stop_after {
            if let Some(stop) = &self.stop {
                stop.stop();
            }
        }
    }

    fn show_blobs(&mut self, name: &str, _image: &Frame, blobs: &[Blob]) {
        self.views.push(name.to_string());
        self.blob_counts.push(blobs.len());
    }
}

fn test_config() -> AnalysisConfig {
    AnalysisConfig {
        blur_kernel_size: 3,
        block_size: 7,
        max_disparity: 8,
        motion_threshold: 10,
        // Above the brightest texture, so only the disc survives binarisation
        blob: ThresholdSweepConfig {
            min_threshold: 130,
            ..ThresholdSweepConfig::default()
        },
        ..AnalysisConfig::default()
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[test]
fn run_loop_presents_every_view_each_cycle() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stop = StopHandle::new();
    let mut recorder = Recorder::new(3);
    recorder.stop = Some(stop.clone());

    let source = CameraPairSource::split(MockCamera::new(VIEW_WIDTH, VIEW_HEIGHT, SHIFT));
    let (pipeline, _tx) = Pipeline::new(source, recorder, test_config()).unwrap();
    let mut pipeline = pipeline.with_stop_handle(stop);

    let summary = pipeline.run().unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.skipped, 0);

    let (source, recorder) = pipeline.into_parts();
    assert_eq!(recorder.disparity_maps, 3);
    assert_eq!(recorder.views.len(), 3 * 5);
    assert_eq!(
        &recorder.views[..5],
        &[
            LEFT_GRAY_VIEW,
            RIGHT_GRAY_VIEW,
            MOTION_VIEW,
            LEFT_BLOB_VIEW,
            RIGHT_BLOB_VIEW
        ]
    );
    assert_eq!(recorder.blob_counts.len(), 6);
    assert_eq!(source.mode(), AcquisitionMode::SplitSingleFrame);
}

#[test]
fn mock_split_pair_recovers_camera_disparity() {
    let mut source = CameraPairSource::split(MockCamera::new(VIEW_WIDTH, VIEW_HEIGHT, SHIFT));
    let pair = source.next().unwrap();
    assert_eq!((pair.width(), pair.height()), (VIEW_WIDTH, VIEW_HEIGHT));

    let report = analyze(&pair, &test_config()).unwrap();

    // Away from the borders both views are exact shifts of one another
    for y in 8..(VIEW_HEIGHT - 8) {
        for x in 16..(VIEW_WIDTH - 8) {
            assert_eq!(
                report.disparity.get(x, y),
                Some(SHIFT as u16),
                "at ({}, {})",
                x,
                y
            );
        }
    }

    // The views differ by the shift, so differencing them finds plenty of change
    assert!(report.motion.changed_pixels() > 0);

    // The moving disc is bright in both views
    assert_eq!(report.left_blobs.len(), 1);
    assert_eq!(report.right_blobs.len(), 1);
    let (l, r) = (&report.left_blobs[0], &report.right_blobs[0]);
    assert!((l.y - r.y).abs() < 1.0);
    assert!(((l.x - r.x) - SHIFT as f64).abs() < 1.0);
}

#[test]
fn sequential_capture_sees_the_disc_move() {
    let camera = MockCamera::new(VIEW_WIDTH, VIEW_HEIGHT, SHIFT);
    let mut source = CameraPairSource::sequential(camera, Duration::from_millis(1));

    let pair = source.next().unwrap();
    assert_eq!(pair.width(), 2 * VIEW_WIDTH);

    let report = analyze(&pair, &test_config()).unwrap();
    assert!(report.motion.changed_pixels() > 0);
    assert!(report.motion.changed_fraction() < 0.1);
}

#[test]
fn channel_source_feeds_pipeline_from_another_thread() {
    let (tx, source) = ChannelPairSource::channel(2, Duration::from_millis(200));

    let producer = thread::spawn(move || {
        let mut camera = CameraPairSource::split(MockCamera::new(VIEW_WIDTH, VIEW_HEIGHT, SHIFT));
        for _ in 0..3 {
            tx.send(camera.next().unwrap()).unwrap();
        }
    });

    let (mut pipeline, _cfg) =
        Pipeline::new(source, stereo_diag::source::NullPresenter, test_config()).unwrap();

    for _ in 0..3 {
        let report = pipeline.step().unwrap();
        assert_eq!(report.mode, AcquisitionMode::SplitSingleFrame);
    }
    producer.join().unwrap();

    // With the producer gone every further acquisition fails, and the loop gives up
    assert!(matches!(pipeline.step(), Err(Error::Capture(_))));
    let mut pipeline = pipeline.with_max_consecutive_failures(2);
    assert!(matches!(pipeline.run(), Err(Error::Capture(_))));
}
