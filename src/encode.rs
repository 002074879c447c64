//! The attempt sequencer: assembles full encoder command lines from a
//! compiled plan and drives the supervisor attempt-by-attempt.

use std::path::Path;

use tracing::warn;

use crate::cancel::CancelToken;
use crate::codec::CodecAttempt;
use crate::graph::FilterGraphPlan;
use crate::process::{ProcessOutcome, Supervisor};
use crate::status::{Severity, StatusSink};

/// Full argument vector for one encode attempt over a compiled plan.
///
/// Shape: inputs, filter graph, stream maps, video codec block, audio codec
/// block, duration cap, `-shortest`, faststart, output path.
pub fn plan_args(plan: &FilterGraphPlan, attempt: &CodecAttempt, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into()];
    args.extend(plan.input_args());
    if !plan.filter_graph.is_empty() {
        args.push("-filter_complex".into());
        args.push(plan.filter_graph.clone());
    }
    args.extend(plan.map_args());
    args.extend(attempt.video_args.iter().cloned());

    if plan.has_composed_audio {
        args.extend(["-c:a", "aac", "-b:a", "192k"].map(String::from));
    } else {
        args.extend(["-c:a", "copy"].map(String::from));
    }

    if plan.total_duration > 0.0 {
        args.push("-t".into());
        args.push(format!("{:.6}", plan.total_duration));
    }
    args.push("-shortest".into());
    args.extend(["-movflags", "+faststart"].map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Drive the supervisor through an ordered attempt list, stopping at the
/// first success or at cancellation. Each retry announces itself and resets
/// the reported progress before the next run starts.
pub fn run_with_attempts<F>(
    supervisor: &Supervisor,
    attempts: &[CodecAttempt],
    mut build_args: F,
    expected_duration: f64,
    cancel: &CancelToken,
    label: &str,
    sink: &dyn StatusSink,
) -> ProcessOutcome
where
    F: FnMut(&CodecAttempt) -> Vec<String>,
{
    let total = attempts.len();
    let mut last = ProcessOutcome {
        success: false,
        stalled: false,
        cancelled: false,
        diagnostic: Some("no codec attempts were planned".to_owned()),
    };

    for (index, attempt) in attempts.iter().enumerate() {
        if index > 0 {
            sink.status(
                &format!(
                    "[{label}] retrying with {} (attempt {}/{total})...",
                    attempt.label,
                    index + 1
                ),
                Severity::Warning,
            );
            sink.progress(0.0);
        }

        let args = build_args(attempt);
        let run_label = format!("{label} - {}", attempt.label);
        let mut on_progress = |fraction: f64| sink.progress(fraction);
        last = supervisor.run(
            &args,
            expected_duration,
            Some(&mut on_progress),
            cancel,
            &run_label,
            sink,
        );

        if last.success || last.cancelled {
            return last;
        }

        warn!(label, attempt = attempt.label, "encode attempt failed");
        if index + 1 < total {
            sink.status(
                &format!("[{label}] {} failed, switching encoder...", attempt.label),
                Severity::Warning,
            );
        }
    }

    last
}

/// Encode a compiled plan to `output`, falling back through `attempts`.
pub fn encode_plan(
    supervisor: &Supervisor,
    plan: &FilterGraphPlan,
    attempts: &[CodecAttempt],
    output: &Path,
    cancel: &CancelToken,
    label: &str,
    sink: &dyn StatusSink,
) -> ProcessOutcome {
    run_with_attempts(
        supervisor,
        attempts,
        |attempt| plan_args(plan, attempt, output),
        plan.total_duration,
        cancel,
        label,
        sink,
    )
}
