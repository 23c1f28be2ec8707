//! Celebrity overlay
//!
//! Drives an asynchronous celebrity recognition job over a stored video and
//! renders the results onto sampled frames.
//!
//! # Flow
//!
//! 1. **Submit**: start a recognition job for the stored video, naming the
//!    topic the service notifies when it finishes.
//! 2. **Wait**: poll the queue subscribed to that topic until a notification
//!    for the job arrives.
//! 3. **Collect**: page through the job results.
//! 4. **Render**: download the video, decode one frame per distinct detection
//!    timestamp (at most five), and draw a colored box and label for every
//!    subject recognised at that instant.
//!
//! # Module Structure
//!
//! - `recognition`, `queue`, `store`: collaborator contracts and records
//! - `job`: submission, completion waiting, result pagination
//! - `video`: decoder contract and frame sampling
//! - `geometry`, `overlay`: coordinate mapping and painting
//! - `aws`: concrete HTTPS clients for the managed services
//! - `pipeline`: the end-to-end runs
//! - `config`, `ui`: layered settings and stage reporting for the binaries

pub mod aws;
pub mod config;
pub mod geometry;
pub mod job;
pub mod overlay;
pub mod pipeline;
pub mod queue;
pub mod recognition;
pub mod store;
pub mod ui;
pub mod video;

pub use geometry::{map_box, NormalizedBox, PixelBox};
pub use job::{
    fetch_all_results, submit_job, CancelToken, Clock, CompletionWaiter, JobResults,
    SystemClock, WaitOutcome, WaitSettings,
};
pub use overlay::{Annotation, OverlayRenderer, OverlayStyle, SubjectColors};
pub use pipeline::{
    annotate_image, Collaborators, FsImageWriter, ImageWriter, PipelineSettings, RunReport,
    VideoPipeline,
};
pub use queue::{NotificationQueue, QueueMessage};
pub use recognition::{
    CelebrityFace, Detection, JobHandle, JobStatus, NotificationChannel, RecognitionService,
    VideoRef,
};
pub use store::ObjectStore;
pub use video::{DefaultVideoOpener, VideoDecoder, VideoOpener};
