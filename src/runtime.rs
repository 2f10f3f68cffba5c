// Wires the serial links, the vision feed and telemetry around the coordinator
//
// The coordinator blocks on serial I/O and gantry moves, so it gets its own
// thread (spawn_blocking). This task keeps the zenoh side moving: it forwards
// detection batches into the pose source's channel and publishes whatever
// status snapshots the coordinator emits.

use std::sync::mpsc::{TrySendError, sync_channel};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    Args, FRAME_TIMEOUT, TOPIC_STATUS, TOPIC_VISION_CALIBRATION, TOPIC_VISION_MARKERS,
    VISION_POLL_HZ,
};
use crate::coordinator::{DockingCoordinator, LockerSession};
use crate::gantry::GcodeGantry;
use crate::link::SerialLink;
use crate::messages::MarkerDetection;
use crate::vision::{CameraCalibration, FeedPoseSource};

// Frames buffered for the pose source; newer frames are dropped while it is full
const FRAME_QUEUE: usize = 8;

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let calibration = CameraCalibration::load(&args.calibration)?;

    info!("Opening serial links...");
    let lv = SerialLink::open("lv", &args.lv_port)?;
    let wpt = SerialLink::open("wpt", &args.wpt_port)?;
    let gantry = GcodeGantry::open(&args.gantry_port)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let markers = session.declare_subscriber(TOPIC_VISION_MARKERS).await?;
    let pub_calibration = session.declare_publisher(TOPIC_VISION_CALIBRATION).await?;
    let pub_status = if args.no_telemetry {
        None
    } else {
        Some(session.declare_publisher(TOPIC_STATUS).await?)
    };

    // Detector uses the same intrinsics the locker was calibrated with
    pub_calibration.put(serde_json::to_string(&calibration)?).await?;

    let (frame_tx, frame_rx) = sync_channel::<Vec<MarkerDetection>>(FRAME_QUEUE);
    let (status_tx, mut status_rx) = unbounded_channel();

    let vision = FeedPoseSource::new(frame_rx, args.marker_id, FRAME_TIMEOUT);
    let mut coordinator = DockingCoordinator::new(LockerSession {
        lv,
        wpt,
        gantry,
        vision,
    })
    .with_attempts(args.attempts)
    .with_status_sink(status_tx);

    info!(
        "Runtime started: LV={}, WPT={}, gantry={}, marker id {}",
        args.lv_port, args.wpt_port, args.gantry_port, args.marker_id
    );
    info!("Subscribed to: {}", TOPIC_VISION_MARKERS);
    if pub_status.is_some() {
        info!("Publishing to: {}", TOPIC_STATUS);
    }

    let mut control = tokio::task::spawn_blocking(move || coordinator.run());
    let mut tick = interval(Duration::from_millis(1000 / VISION_POLL_HZ));

    loop {
        tokio::select! {
            result = &mut control => {
                // The coordinator only returns when a link or the gantry failed
                result??;
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        // 1. Forward detection batches (non-blocking)
        while let Ok(Some(sample)) = markers.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<Vec<MarkerDetection>>(&payload) {
                Ok(batch) => match frame_tx.try_send(batch) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => debug!("Frame queue full, dropping frame"),
                    Err(TrySendError::Disconnected(_)) => warn!("Pose source gone"),
                },
                Err(e) => {
                    warn!("Failed to parse detections: {}", e);
                }
            }
        }

        // 2. Publish status snapshots
        while let Ok(status) = status_rx.try_recv() {
            if let Some(publisher) = &pub_status {
                let status_json = serde_json::to_string(&status)?;
                publisher.put(status_json).await?;
            }
        }
    }
}
