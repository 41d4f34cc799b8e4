// MIDI Orchestrator - plays a Standard MIDI File through a MIDI output port

use clap::Parser;
use midi_orchestrator::messaging::{NotificationConsumer, create_notification_channel};
use midi_orchestrator::midi::output::list_output_ports;
use midi_orchestrator::{
    MidirOutput, OutputError, ParsedSequence, PlayerConfig, RecordingOutput,
    Sequencer, SequencerClock, load_file,
};
use ringbuf::traits::Consumer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Standard MIDI File player
#[derive(Parser, Debug)]
#[command(name = "midi-orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play a Standard MIDI File through a MIDI output port", long_about = None)]
struct Args {
    /// Path to the .mid file to play
    #[arg(value_name = "FILE", required_unless_present = "list_ports")]
    file: Option<PathBuf>,

    /// Output port name (defaults to the configured port, then the first one)
    #[arg(short, long, value_name = "NAME")]
    port: Option<String>,

    /// List available output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Print every message with its tick instead of playing it
    #[arg(long)]
    dry_run: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Tempo override in beats per minute
    #[arg(long, value_name = "BPM")]
    bpm: Option<f64>,

    /// Start position, 1-based
    #[arg(long, value_name = "MEASURE[:BEAT]", value_parser = parse_position)]
    start: Option<(u64, u64)>,
}

fn parse_position(s: &str) -> Result<(u64, u64), String> {
    let (measure, beat) = match s.split_once(':') {
        Some((measure, beat)) => (measure, beat),
        None => (s, "1"),
    };
    let measure = measure
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid measure '{}': {}", measure, e))?;
    let beat = beat
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid beat '{}': {}", beat, e))?;
    if measure == 0 || beat == 0 {
        return Err("measure and beat start at 1".to_string());
    }
    Ok((measure, beat))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_ports {
        return match list_output_ports() {
            Ok(ports) if ports.is_empty() => {
                println!("No MIDI output ports available");
                ExitCode::SUCCESS
            }
            Ok(ports) => {
                for (i, name) in ports.iter().enumerate() {
                    println!("{}: {}", i, name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(file) = args.file.as_ref() else {
        eprintln!("ERROR: no MIDI file given");
        return ExitCode::FAILURE;
    };

    let config = PlayerConfig::load_or_default(args.config.as_deref());
    let bpm = args.bpm.or(config.start_bpm);

    let sequence = match load_file(file, config.fallback_ticks_per_quarter) {
        Ok(sequence) => sequence,
        Err(e) => {
            eprintln!("ERROR: {}: {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let summary = sequence.summary();
    println!(
        "{}: {} tracks, {} measures, {:.1}s",
        file.display(),
        sequence.tracks.len(),
        summary.measures,
        summary.duration.as_secs_f64()
    );

    if args.dry_run {
        return match dry_run(&sequence, bpm, args.start) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let output = match connect(args.port.as_deref().or(config.output_port.as_deref())) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (notification_tx, notification_rx) =
        create_notification_channel(config.notification_capacity);
    let mut sequencer = Sequencer::new(Box::new(output), notification_tx);

    match play(&mut sequencer, &sequence, bpm, args.start) {
        Ok(()) => {
            drain_notifications(notification_rx);
            ExitCode::SUCCESS
        }
        Err(e) => {
            drain_notifications(notification_rx);
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn connect(port: Option<&str>) -> Result<MidirOutput, OutputError> {
    match port {
        Some(name) => MidirOutput::connect(name),
        None => MidirOutput::connect_default(),
    }
}

fn play(
    sequencer: &mut Sequencer,
    sequence: &ParsedSequence,
    bpm: Option<f64>,
    start: Option<(u64, u64)>,
) -> Result<(), midi_orchestrator::TransportError> {
    sequencer.load(sequence)?;
    // Locating rewinds the tempo, so the override goes last
    if let Some((measure, beat)) = start {
        sequencer.locate(measure, beat)?;
    }
    if let Some(bpm) = bpm {
        sequencer.set_bpm(bpm)?;
    }
    sequencer.start()?;
    sequencer.wait_until_finished()
}

/// Step the clock without waiting and print what would be sent
fn dry_run(
    sequence: &ParsedSequence,
    bpm: Option<f64>,
    start: Option<(u64, u64)>,
) -> Result<(), midi_orchestrator::TransportError> {
    let mut clock = SequencerClock::new(sequence);
    if let Some((measure, beat)) = start {
        clock.locate(measure, beat)?;
    }
    if let Some(bpm) = bpm {
        clock.request_bpm(bpm);
        clock.apply_pending();
    }

    let mut recorder = RecordingOutput::new();
    let mut elapsed = Duration::ZERO;
    while let Some(delta) = clock.next_delta() {
        elapsed += clock.wait_for(delta);
        let report = clock.advance(delta, &mut recorder);
        for message in recorder.take() {
            println!(
                "{:>8} {:>10.3}s  {:?}",
                report.tick,
                elapsed.as_secs_f64(),
                message
            );
        }
    }

    clock.silence(&mut recorder);
    let released = recorder.take().len();
    if released > 0 {
        println!("{} note(s) still held at the end", released);
    }
    Ok(())
}

fn drain_notifications(mut rx: NotificationConsumer) {
    while let Some(notification) = rx.try_pop() {
        println!("{}", notification);
    }
}
