//! Vireo renders finished videos by driving the system `ffmpeg` binary.
//!
//! A declarative [`JobSpec`] — base footage plus optional narration, music,
//! overlays, subtitles, chroma-keyed presenter, fade-out and a typed-text
//! intro — is compiled into an ordered multi-input filter graph and executed
//! by a supervised encoder process.
//!
//! # Pipeline overview
//!
//! 1. **Probe**: `ffprobe` resolves durations and stream layouts ([`probe`])
//! 2. **Compile**: `JobSpec -> FilterGraphPlan` (validated pads/labels,
//!    deterministic input order) ([`graph`])
//! 3. **Plan codecs**: preference + detected encoders -> ordered
//!    [`CodecAttempt`] list, hardware first, software fallback ([`codec`])
//! 4. **Encode**: the supervisor runs each attempt, streaming `key=value`
//!    progress, enforcing stall and cancellation semantics ([`process`])
//! 5. **Intro** (optional): rasterized typing animation + synthesized
//!    keystroke audio, cross-faded onto the main render ([`intro`])
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **No uncaught faults across the orchestrator boundary**: every
//!   operation returns a result or a tagged absence; the orchestrator emits
//!   exactly one `Finished` event per job on every path.
//! - **No orphaned processes**: every spawned encoder is tracked in a
//!   [`ProcessRegistry`] whose `terminate_all` runs at host shutdown.
//! - **Out-of-scope**: GUI, configuration persistence, licensing, batch
//!   discovery loops and downloads live in callers; this crate is the
//!   rendering engine they drive.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cancel;
mod error;
mod status;

pub mod codec;
pub mod encode;
pub mod graph;
pub mod intro;
pub mod job;
pub mod lang;
pub mod pipeline;
pub mod playlist;
pub mod pool;
pub mod probe;
pub mod process;
pub mod subtitle;

pub use cancel::CancelToken;
pub use codec::{CodecAttempt, EncoderInventory, plan_attempts};
pub use encode::{encode_plan, plan_args, run_with_attempts};
pub use error::{VireoError, VireoResult};
pub use graph::{CompileInputs, FilterGraphPlan, GraphBuilder, InputSpec, MapTarget, Pad, compile};
pub use intro::{
    IntroClipResult, IntroTiming, crossfade_duration, crossfade_offset, render_intro_clip,
    stitch_intro,
};
pub use job::{
    ChromaKey, CodecPreference, Corner, EffectBlendMode, EffectOverlay, FadeOut, IntroSpec,
    JobSpec, PngOverlay, PresenterOverlay, PresenterPosition, Resolution, SubtitleStyle,
};
pub use pipeline::RenderPipeline;
pub use pool::JobPool;
pub use probe::{MediaProber, MediaProperties, StreamInfo, StreamKind, parse_probe_output};
pub use process::{ProcessOutcome, ProcessRegistry, StallPolicy, Supervisor};
pub use status::{ChannelSink, NullSink, Severity, StatusEvent, StatusSink};
