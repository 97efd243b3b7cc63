//! Wavebridge CLI: load a computation module and play it live or render it to WAV.

use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::error::Error;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wavebridge_engine::scope::Polyline;
use wavebridge_engine::{
    analyser, initialize_graph, AudioContext, BridgeConfig, Controller, Engine, LoadOutcome, ManifestLoader,
    OfflineHost, Parameter, QuantumAdapter, RenderStats, SharedRegistry, SourceDescriptor, VisualizationSampler,
    WorkletNode, WorkletProcessor,
};

#[derive(Parser, Debug)]
#[command(name = "wavebridge")]
#[command(about = "Real-time player for asynchronously loaded computation modules", long_about = None)]
struct Args {
    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Output device name (default device otherwise)
    #[arg(long)]
    device: Option<String>,

    /// Requested sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Requested output channel count
    #[arg(long)]
    channels: Option<u16>,

    /// Stop after this many seconds (offline renders default to 2)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Module manifest: a path, a file:// URL, or inline TOML (default: 440 Hz sine)
    #[arg(short, long)]
    module: Option<String>,

    /// Override the module frequency in Hz
    #[arg(short, long)]
    frequency: Option<f32>,

    /// Override the module phase offset in radians
    #[arg(long)]
    phase: Option<f32>,

    /// Bridge config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Draw an ASCII oscilloscope on stderr while playing
    #[arg(long)]
    scope: bool,

    /// Render offline to this WAV file instead of playing
    #[arg(long, value_name = "WAV")]
    render: Option<PathBuf>,
}

fn list_output_devices() -> Result<(), Box<dyn Error>> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        return Err(format!("requested device not found: {name}").into());
    }
    host.default_output_device().ok_or_else(|| "no default output device".into())
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig, Box<dyn Error>> {
    if req_sr.is_none() && req_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    // score each range by distance from the request; rate mismatches weigh most
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;
        let ch_pen = req_ch.map_or(0, |c| u64::from(range.channels().abs_diff(c)));
        let sr_pen = req_sr.map_or(0, |sr| {
            if (sr_min..=sr_max).contains(&sr) { 0 } else { u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))) }
        });
        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or("no supported output configs")?;
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut adapter: QuantumAdapter,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = usize::from(cfg.channels).max(1);
    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            for frame in output.chunks_mut(channels) {
                frame.fill(T::from_sample(adapter.next_sample()));
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Rasterize a polyline into rows of text, one column per point bucket.
fn draw_ascii(line: &Polyline) -> String {
    let cols = line.width.max(1.0) as usize;
    let rows = line.height.max(1.0) as usize;
    let mut grid = vec![vec![' '; cols]; rows];
    for &(x, y) in &line.points {
        let c = (x as usize).min(cols - 1);
        let r = (y.max(0.0) as usize).min(rows - 1);
        grid[r][c] = '*';
    }
    let mut out = String::with_capacity((cols + 1) * rows);
    for row in grid {
        out.extend(row);
        out.push('\n');
    }
    out
}

fn load_config(args: &Args) -> Result<BridgeConfig, Box<dyn Error>> {
    let mut cfg = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(sr) = args.sample_rate {
        cfg.sample_rate = sr;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Native objects for one session, after the init handshake.
struct Session {
    context: Arc<AudioContext>,
    node: Arc<WorkletNode>,
}

async fn open_session(config: &BridgeConfig, sample_rate: f32) -> Result<Session, Box<dyn Error>> {
    let registry = SharedRegistry::new();
    let engine = Engine::new(registry.clone(), config.clone());
    let context = AudioContext::new(sample_rate);
    let root = registry.register(&context);
    let node = initialize_graph(&engine, root, sample_rate, |state| log::info!("engine: {state:?}")).await?;
    let node = registry.resolve::<WorkletNode>(node)?;
    Ok(Session { context, node })
}

async fn load(args: &Args, controller: &Controller<ManifestLoader>) -> Result<(), Box<dyn Error>> {
    let source = args.module.as_deref().map_or_else(|| SourceDescriptor::text(""), SourceDescriptor::from_arg);
    match controller.load_module(source).await?? {
        LoadOutcome::Published(generation) => log::info!("module generation {generation} is live"),
        LoadOutcome::Stale(generation) => log::warn!("module generation {generation} superseded"),
    }
    // queued behind the install, so they land on the new module
    if let Some(hz) = args.frequency {
        controller.set_parameter(Parameter::Frequency, hz)?;
    }
    if let Some(phase) = args.phase {
        controller.set_parameter(Parameter::Phase, phase)?;
    }
    Ok(())
}

fn log_stats(stats: &RenderStats) {
    let s = stats.snapshot();
    log::info!(
        "quanta {} (silent {}), overruns {}, faults {}, dropped params {}, stale installs {}",
        s.quanta,
        s.silent_quanta,
        s.overruns,
        s.faults,
        s.dropped_parameters,
        s.stale_installs
    );
}

async fn render_offline(args: &Args, config: &BridgeConfig, path: &Path) -> Result<(), Box<dyn Error>> {
    let sample_rate = config.sample_rate;
    let session = open_session(config, sample_rate as f32).await?;
    let mut host = OfflineHost::new(session.node.connect(None)?);
    let controller = Controller::for_node(&session.node, ManifestLoader, sample_rate as f32);
    session.context.resume();
    load(args, &controller).await?;

    let frames = (args.duration.unwrap_or(2.0).max(0.0) * f64::from(sample_rate)) as usize;
    let samples = host.render(frames);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    log::info!("wrote {frames} frames to {}", path.display());

    log_stats(controller.stats());
    session.context.close();
    Ok(())
}

async fn play(args: &Args, config: &BridgeConfig) -> Result<(), Box<dyn Error>> {
    let device = pick_device(args.device.as_deref())?;
    let sup_cfg = choose_config(&device, args.sample_rate, args.channels)?;
    let sample_format = sup_cfg.sample_format();
    let mut cfg = sup_cfg.config();
    if let Some(ch) = args.channels {
        cfg.channels = ch;
    }
    let sample_rate = cfg.sample_rate.0 as f32;

    log::info!("device: {}", device.name()?);
    log::info!("stream config: {cfg:?} (sample_format: {sample_format:?})");

    let session = open_session(config, sample_rate).await?;
    let (processor, scope_task) = if args.scope {
        let (analyser, tap) = analyser(config.analyser_fft_size);
        let processor = session.node.connect(Some(tap))?;
        let fps = config.scope_fps;
        let task = tokio::spawn(async move {
            let mut sampler = VisualizationSampler::new(analyser);
            sampler
                .run(fps, 96.0, 16.0, |line| {
                    eprint!("\x1b[2J\x1b[H{}", draw_ascii(line));
                    ControlFlow::Continue(())
                })
                .await;
        });
        (processor, Some(task))
    } else {
        (session.node.connect(None)?, None)
    };
    let controller = Controller::for_node(&session.node, ManifestLoader, sample_rate);

    let err_fn = |e: cpal::StreamError| log::error!("stream error: {e}");
    let stream = build_for_format(&device, &cfg, sample_format, processor, err_fn)?;
    session.context.resume();
    stream.play()?;

    load(args, &controller).await?;

    let stats = controller.stats().clone();
    let meter_every = Duration::from_millis(config.meter_interval_ms.max(10));
    let meter = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(meter_every);
        loop {
            ticks.tick().await;
            log::debug!("peak ~ {:.3}", stats.take_peak());
        }
    });

    match args.duration {
        Some(d) => tokio::time::sleep(Duration::from_secs_f64(d.max(0.0))).await,
        None => {
            log::info!("press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    meter.abort();
    if let Some(task) = scope_task {
        task.abort();
    }
    drop(stream);
    log_stats(controller.stats());
    session.context.close();
    Ok(())
}

fn build_for_format(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    processor: WorkletProcessor,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let adapter = QuantumAdapter::new(processor);
    match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, cfg, adapter, err_fn),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, cfg, adapter, err_fn),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, cfg, adapter, err_fn),
        other => Err(format!("unsupported device sample format: {other:?}").into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    if args.list_devices {
        return list_output_devices();
    }

    let config = load_config(&args)?;
    match &args.render {
        Some(path) => render_offline(&args, &config, path).await,
        None => play(&args, &config).await,
    }
}
