use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use vireo::{
    CancelToken, ChannelSink, JobSpec, MediaProber, RenderPipeline, Severity, StatusEvent,
};

#[derive(Parser, Debug)]
#[command(name = "vireo", version)]
struct Cli {
    /// Path to the ffmpeg executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect a media file's duration and streams.
    Probe(ProbeArgs),
    /// Render a job described by a JSON job file.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to inspect.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input job JSON (a serialized `JobSpec`).
    #[arg(long)]
    job: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(&cli.ffmpeg, args),
        Command::Render(args) => cmd_render(&cli.ffmpeg, args),
    }
}

fn cmd_probe(ffmpeg: &PathBuf, args: ProbeArgs) -> anyhow::Result<()> {
    let prober = MediaProber::from_ffmpeg_path(ffmpeg);
    match prober.probe(&args.in_path) {
        Some(props) => {
            println!("duration: {:.3}s", props.duration_sec);
            for (index, stream) in props.streams.iter().enumerate() {
                println!("stream {index}: {:?} ({})", stream.kind, stream.codec);
            }
            Ok(())
        }
        None => anyhow::bail!("could not probe '{}'", args.in_path.display()),
    }
}

fn cmd_render(ffmpeg: &PathBuf, args: RenderArgs) -> anyhow::Result<()> {
    let job_json = std::fs::read_to_string(&args.job)
        .with_context(|| format!("failed to read job file '{}'", args.job.display()))?;
    let job: JobSpec = serde_json::from_str(&job_json)
        .with_context(|| format!("invalid job file '{}'", args.job.display()))?;

    let pipeline = RenderPipeline::new(ffmpeg.clone());
    let (sink, events) = ChannelSink::new();

    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                StatusEvent::Status { text, severity } => match severity {
                    Severity::Info => println!("{text}"),
                    Severity::Warning => println!("WARN  {text}"),
                    Severity::Error => eprintln!("ERROR {text}"),
                },
                StatusEvent::Progress(fraction) => {
                    print!("\rprogress: {:5.1}%", fraction * 100.0);
                    use std::io::Write as _;
                    let _ = std::io::stdout().flush();
                }
                StatusEvent::BatchProgress(_) => {}
                StatusEvent::Finished(_) => println!(),
            }
        }
    });

    let cancel = CancelToken::new();
    let success = pipeline.render(&job, &cancel, &sink);

    drop(sink);
    let _ = printer.join();
    pipeline.registry().terminate_all();

    if success {
        println!("done: {}", job.output_path().display());
        Ok(())
    } else {
        anyhow::bail!("render failed")
    }
}
