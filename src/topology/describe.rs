//! Pipeline names and textual descriptions.
//!
//! Every engine-side name the orchestrator uses is produced here, so the
//! builder, the snapshot coordinator and the workers agree on them.

// Internal module imports
use crate::config::model::{CameraSpec, ReportMode};
use crate::engine::source_element_name;

/// Multi-branch persistent recording entity
pub const RECORDER: &str = "record_h264";
/// Shared JPEG transcoder entity
pub const ENCODER: &str = "encode_jpeg";
pub const ENCODER_SINK: &str = "encode_jpeg_sink";
/// Single-frame capture entity
pub const IMAGE_CAPTURE: &str = "snap_jpeg";
pub const IMAGE_FILESINK: &str = "snap_jpeg_filesink";
/// Buffered multi-camera video snapshot entity
pub const VIDEO_SNAPSHOT: &str = "snap_video";
pub const VIDEO_FILESINK: &str = "snap_video_filesink";
const VIDEO_MUXER: &str = "snapmux";

/// Signal emitted per frame by the frame-counter tap
pub const HANDOFF_SIGNAL: &str = "handoff";

const INTERPIPE_SINK_OPTS: &str = "forward-events=true forward-eos=true sync=false";

pub fn multisink_name(camera: &str) -> String {
    format!("multisink_{camera}")
}

pub fn buffer_entity_name(camera: &str) -> String {
    format!("buffer_h264_{camera}")
}

pub fn buffer_queue_name(camera: &str) -> String {
    format!("fifo_queue_{camera}")
}

pub fn buffer_sink_name(camera: &str) -> String {
    format!("buffer_{camera}")
}

pub fn counter_name(camera: &str) -> String {
    format!("counter_{camera}")
}

pub fn progress_name(camera: &str) -> String {
    format!("progress_{camera}")
}

/// `rtspsrc ! rtph264depay ! h264parse ! [tap] queue ! interpipesink name=<camera>`
pub fn camera(spec: &CameraSpec) -> String {
    let tap = match spec.report {
        ReportMode::None => String::new(),
        ReportMode::Progress => format!(
            "progressreport name={} update-freq={} silent=false ! ",
            progress_name(&spec.name),
            spec.report_interval
        ),
        ReportMode::FrameCounter => format!(
            "identity name={} signal-handoffs=true silent=true ! ",
            counter_name(&spec.name)
        ),
    };
    format!(
        "rtspsrc location={uri} ! rtph264depay ! h264parse ! {tap}queue ! interpipesink name={name} {INTERPIPE_SINK_OPTS}",
        uri = spec.uri,
        name = spec.name,
    )
}

/// One branch per camera, all in a single entity.
pub fn recording(cameras: &[CameraSpec]) -> String {
    cameras
        .iter()
        .map(|cam| {
            format!(
                "interpipesrc name={RECORDER}_src_{name} format=time allow-renegotiation=false listen-to={name} \
                 ! splitmuxsink name={sink} async-finalize=true muxer-pad-map=x-pad-map,video=video_0",
                name = cam.name,
                sink = multisink_name(&cam.name),
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leaky FIFO holding the look-back window of one camera. Size limits are
/// set as properties after creation.
pub fn buffer(camera: &str) -> String {
    let entity = buffer_entity_name(camera);
    format!(
        "interpipesrc name={src} format=time listen-to={camera} \
         ! queue name={queue} max-size-buffers=0 leaky=2 silent=true flush-on-eos=false \
         ! interpipesink name={sink} {INTERPIPE_SINK_OPTS}",
        src = source_element_name(&entity),
        queue = buffer_queue_name(camera),
        sink = buffer_sink_name(camera),
    )
}

/// One source per camera index into a shared MP4 muxer.
pub fn video_snapshot(cameras: &[CameraSpec]) -> String {
    let mut parts: Vec<String> = cameras
        .iter()
        .enumerate()
        .map(|(ci, cam)| {
            format!(
                "interpipesrc name={VIDEO_SNAPSHOT}_src_{ci} format=time allow-renegotiation=false listen-to={buffer} \
                 ! {VIDEO_MUXER}.video_{ci}",
                buffer = buffer_sink_name(&cam.name),
            )
        })
        .collect();
    parts.push(format!(
        "mp4mux name={VIDEO_MUXER} ! filesink name={VIDEO_FILESINK}"
    ));
    parts.join(" ")
}

/// H.264 to JPEG transcoder, initially listening to `first_camera`.
pub fn encoder(first_camera: &str) -> String {
    format!(
        "interpipesrc name={src} format=time listen-to={first_camera} ! avdec_h264 ! jpegenc \
         ! interpipesink name={ENCODER_SINK} {INTERPIPE_SINK_OPTS} async=false enable-last-sample=false drop=true",
        src = source_element_name(ENCODER),
    )
}

/// Captures one JPEG frame from the transcoder.
pub fn image_capture() -> String {
    format!(
        "interpipesrc name={src} format=time listen-to={ENCODER_SINK} num-buffers=1 \
         ! filesink name={IMAGE_FILESINK}",
        src = source_element_name(IMAGE_CAPTURE),
    )
}
