#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "The soundsnap simulator requires the \"cli\" feature. Rebuild with `--features cli` to enable it."
    );
}

#[cfg(feature = "cli")]
mod cli {
    use std::env;
    use std::path::PathBuf;

    use anyhow::{bail, Context};
    use soundsnap::{
        provider, AudioClip, CancellationMode, CancellationSource, DspClock, LoopCount,
        MixerGroup, PoolSettings, SnapBuilder, SnapGroup, SoundBuilder, VirtualBackend,
    };
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    const DEFAULT_TICK_HZ: f64 = 60.0;
    const DEFAULT_DURATION_SECS: f64 = 4.0;
    const SAMPLE_RATE: u32 = 48_000;

    struct Options {
        settings: Option<PathBuf>,
        duration: f64,
        tick_hz: f64,
    }

    fn parse_args() -> anyhow::Result<Options> {
        let mut options = Options {
            settings: None,
            duration: DEFAULT_DURATION_SECS,
            tick_hz: DEFAULT_TICK_HZ,
        };
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--duration" => {
                    let value = args.next().context("--duration needs a value")?;
                    options.duration = value
                        .parse()
                        .with_context(|| format!("invalid duration: {value}"))?;
                }
                "--tick-hz" => {
                    let value = args.next().context("--tick-hz needs a value")?;
                    options.tick_hz = value
                        .parse()
                        .with_context(|| format!("invalid tick rate: {value}"))?;
                }
                flag if flag.starts_with("--") => bail!("unknown flag: {flag}"),
                path => options.settings = Some(PathBuf::from(path)),
            }
        }
        if options.tick_hz <= 0.0 {
            bail!("tick rate must be positive");
        }
        Ok(options)
    }

    fn clip(name: &str, seconds: f64) -> AudioClip {
        AudioClip::new(name, (seconds * SAMPLE_RATE as f64) as u32, SAMPLE_RATE, 2)
    }

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        let options = parse_args()?;
        let settings = match &options.settings {
            Some(path) => PoolSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => PoolSettings::default(),
        };
        info!(?settings, "pool settings");

        let backend = VirtualBackend::new();
        provider::install_backend(backend.audio_backend(), settings);
        let pool = provider::default_pool()?;
        let sfx = MixerGroup::new("sfx");

        let footsteps = SnapGroup::new();
        let step = clip("footstep", 0.3);
        for offset in [0.0, 0.01, 0.07] {
            let handle = SnapBuilder::get()
                .with_clip(step.clone())?
                .with_output(Some(sfx.clone()))?
                .with_delay(offset)?
                .adjust_volume_for_overlap(&footsteps, backend.clock().as_ref())?
                .with_on_end(move |cause| info!(offset, ?cause, "footstep ended"))?
                .play(&pool)?;
            info!(offset, volume = handle.volume()?, "footstep queued");
            footsteps.add(&handle)?;
        }

        let cancel = CancellationSource::new();
        let engine = SoundBuilder::get()
            .with_clip(clip("engine", 1.0))?
            .with_output(Some(sfx.clone()))?
            .with_start_sample(0)?
            .with_loop_start_sample((SAMPLE_RATE / 4) as i32)?
            .with_end_sample((SAMPLE_RATE * 3 / 4) as i32)?
            .with_loop(LoopCount::Finite(4))?
            .with_on_start(|()| info!("engine started"))?
            .with_on_loop(|()| info!("engine wrapped"))?
            .with_on_end(|cause| info!(?cause, "engine ended"))?
            .play(&pool)?
            .with_cancellation(&cancel.token(), CancellationMode::Stop);

        let alarm = SnapBuilder::get()
            .with_clip(clip("alarm", 0.5))?
            .with_output(Some(sfx))?
            .with_loop(true)?
            .with_schedule(backend.clock().dsp_time() + 1.5)?
            .with_on_start(|()| info!("alarm started"))?
            .with_on_stop(|()| info!("alarm stopped"))?
            .play(&pool)?;
        alarm.on_end(|cause| info!(?cause, "alarm ended"))?;

        let dt = 1.0 / options.tick_hz;
        let ticks = (options.duration * options.tick_hz).ceil() as u64;
        for tick in 0..ticks {
            backend.advance(dt);
            pool.tick();
            if tick == ticks / 2 && alarm.is_active() {
                info!("stopping alarm");
                alarm.stop()?;
            }
        }
        cancel.cancel();
        pool.shutdown();

        let diagnostics = pool.diagnostics();
        println!("\n=== Simulation Statistics ===");
        println!("Simulated time:      {:.2} seconds", backend.clock().dsp_time());
        println!("Units created:       {}", pool.unit_count());
        println!("Devices allocated:   {}", backend.device_count());
        println!("Engine still active: {}", engine.is_active());
        println!("Capacity exceeded:   {}", diagnostics.capacity_exceeded);
        println!("Missing mixer group: {}", diagnostics.missing_mixer_group);
        println!("Retired units:       {}", diagnostics.retired_units);

        provider::reset();
        Ok(())
    }
}

#[cfg(feature = "cli")]
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
