// metronome - Play a metronome on an audio device or render it to a WAV file

use metronome_engine::audio::AudioDeviceManager;
use metronome_engine::audio::export::export_wav;
use metronome_engine::output::{AudioBackend, OutputResult};
use metronome_engine::{
    AppConfig, AudioSink, BeatScheduler, OfflineBackend, OutputError, OutputRegistry, OutputSink,
    SchedulerThread, SinkConfig, SoundSourceKind, StreamClock, Subdivision, SystemClock,
    TimeSignature,
};
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const DEFAULT_SECONDS: f64 = 8.0;
const RENDER_SAMPLE_RATE: u32 = 48_000;

const USAGE: &str = "Usage: metronome [--config PATH] [--bpm N] [--signature B/N]
                 [--subdivision quarter|eighth|sixteenth|triplet]
                 [--seconds S] [--sink click|sample] [--device NAME]
                 [--render-wav PATH]
       metronome --list-devices";

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    bpm: Option<f64>,
    signature: Option<TimeSignature>,
    subdivision: Option<Subdivision>,
    seconds: Option<f64>,
    sink: Option<String>,
    device: Option<String>,
    render_wav: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("missing value for {}", flag))
        };
        match flag.as_str() {
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--bpm" => {
                let raw = value()?;
                let bpm = raw.parse().map_err(|_| format!("invalid BPM '{}'", raw))?;
                options.bpm = Some(bpm);
            }
            "--signature" => options.signature = Some(value()?.parse()?),
            "--subdivision" => options.subdivision = Some(value()?.parse()?),
            "--seconds" => {
                let raw = value()?;
                let seconds: f64 = raw
                    .parse()
                    .map_err(|_| format!("invalid duration '{}'", raw))?;
                if !(seconds > 0.0) {
                    return Err(format!("duration must be positive, got {}", raw));
                }
                options.seconds = Some(seconds);
            }
            "--sink" => {
                let kind = value()?;
                if SoundSourceKind::from_tag(&kind).is_none() {
                    return Err(format!("unknown sink type '{}'", kind));
                }
                options.sink = Some(kind);
            }
            "--device" => options.device = Some(value()?),
            "--render-wav" => options.render_wav = Some(PathBuf::from(value()?)),
            "--list-devices" => options.list_devices = true,
            "-h" | "--help" => return Err(String::new()),
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    Ok(options)
}

/// Merge command-line overrides into the loaded config
fn build_config(options: &Options) -> Result<(AppConfig, SinkConfig), Box<dyn Error>> {
    let mut app = match &options.config {
        Some(path) => AppConfig::load(path)?,
        None => match AppConfig::default_path() {
            Some(path) => AppConfig::load_or_default(&path)?,
            None => AppConfig::default(),
        },
    };

    if let Some(bpm) = options.bpm {
        app.metronome.tempo = metronome_engine::Tempo::new(bpm);
    }
    if let Some(signature) = options.signature {
        app.metronome.time_signature = signature;
        app.metronome.accents = metronome_engine::sequencer::default_pattern(&signature);
    }
    if let Some(subdivision) = options.subdivision {
        app.metronome.subdivision = subdivision;
    }
    app = app.normalized();

    let mut sink = match &options.sink {
        Some(kind) => app
            .sinks
            .iter()
            .find(|sink| &sink.kind == kind)
            .cloned()
            .unwrap_or_else(|| SinkConfig::new(kind.clone(), kind.clone())),
        None => app
            .active_sink_config()
            .cloned()
            .unwrap_or_else(|| SinkConfig::new("click", "click")),
    };

    if let Some(device) = &options.device {
        if !sink.options.is_object() {
            sink.options = serde_json::json!({});
        }
        if let Some(map) = sink.options.as_object_mut() {
            map.insert("device".to_string(), serde_json::json!(device));
        }
    }

    Ok((app, sink))
}

fn list_devices() {
    let devices = AudioDeviceManager::new().list_output_devices();
    if devices.is_empty() {
        println!("No output devices found");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{}", device.name, marker);
    }
}

/// Play on the audio device for `seconds`
fn play(app: AppConfig, sink: SinkConfig, seconds: f64) -> Result<(), Box<dyn Error>> {
    let clock = Arc::new(SystemClock::new());
    let registry = OutputRegistry::with_default_factories(clock.clone()).into_shared();
    let scheduler = BeatScheduler::new(clock, registry);
    let driver = SchedulerThread::spawn(scheduler)?;

    let _ticks = driver.on_tick(|tick| {
        if tick.is_main_beat() {
            println!(
                "measure {:>3}  beat {}  {:?}",
                tick.measure_number, tick.beat_number, tick.accent
            );
        }
    });
    let _errors = driver.on_error(|error| eprintln!("WARNING: {}", error));

    println!(
        "Playing {} BPM {} ({}) on sink '{}' for {}s",
        app.metronome.tempo.bpm(),
        app.metronome.time_signature,
        app.metronome.subdivision,
        sink.id,
        seconds
    );
    driver.initialize(app.metronome, sink)?;
    driver.start()?;
    thread::sleep(Duration::from_secs_f64(seconds));
    driver.stop()?;
    driver.dispose()?;
    driver.shutdown();
    Ok(())
}

/// Render `seconds` of metronome offline and write a 16-bit WAV
fn render(
    app: AppConfig,
    sink: SinkConfig,
    seconds: f64,
    path: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let clock = StreamClock::new(RENDER_SAMPLE_RATE as f64);
    let (backend, output) = OfflineBackend::new(clock.clone());
    let backend: Mutex<Option<Box<dyn AudioBackend>>> = Mutex::new(Some(Box::new(backend)));

    let source = SoundSourceKind::from_tag(&sink.kind)
        .ok_or_else(|| OutputError::UnknownSinkType(sink.kind.clone()))?;
    let sink_clock = clock.clone();

    let mut registry = OutputRegistry::new();
    registry.register_factory(
        source.tag(),
        Box::new(move |config: &SinkConfig| -> OutputResult<Box<dyn OutputSink>> {
            let backend = backend
                .lock()
                .map_err(|_| OutputError::Initialization("offline backend lock poisoned".to_string()))?
                .take()
                .ok_or_else(|| {
                    OutputError::Initialization("offline backend already in use".to_string())
                })?;
            Ok(Box::new(AudioSink::new(
                config.id.clone(),
                source,
                Arc::new(sink_clock.clone()),
                backend,
            )))
        }),
    );

    let mut scheduler = BeatScheduler::new(Arc::new(clock), registry.into_shared());
    scheduler.initialize(app.metronome, sink)?;
    scheduler.start()?;

    let total = (seconds * RENDER_SAMPLE_RATE as f64).round() as usize;
    let block = (metronome_engine::sequencer::POLL_INTERVAL.as_secs_f64()
        * RENDER_SAMPLE_RATE as f64) as usize;
    let mut samples = vec![0.0f32; total];
    for chunk in samples.chunks_mut(block) {
        output.render(chunk);
        scheduler.poll();
    }

    scheduler.stop()?;
    scheduler.dispose()?;

    export_wav(&path, &samples, RENDER_SAMPLE_RATE)?;
    println!("Wrote {:.1}s to {}", seconds, path.display());
    Ok(())
}

fn run(options: Options) -> Result<(), Box<dyn Error>> {
    if options.list_devices {
        list_devices();
        return Ok(());
    }

    let (app, sink) = build_config(&options)?;
    let seconds = options.seconds.unwrap_or(DEFAULT_SECONDS);

    match options.render_wav.clone() {
        Some(path) => render(app, sink, seconds, path),
        None => play(app, sink, seconds),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("ERROR: {}", message);
            }
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    }
}
