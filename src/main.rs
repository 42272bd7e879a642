//! World map demo host
//!
//! Runs a simulated game server and drives the map render scheduler from its
//! tick loop. Operator commands are read from stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use worldmap::commands::run_line;
use worldmap::render::{PngTileCompositor, Scheduler};
use worldmap::utils::settings::{default_settings_path, load_or_default};
use worldmap::world::SimulatedWorld;
use worldmap::{BlockType, ChunkBounds, ChunkCoord, HOST_TICK_MS, LoadMode, SurfaceColumn};

/// Render a live world into map tiles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the simulated world
    #[arg(long, default_value = "overworld")]
    world: String,

    /// Terrain seed
    #[arg(long, default_value_t = 1337)]
    seed: u32,

    /// Generated area radius in chunks around the origin
    #[arg(long, default_value_t = 48)]
    radius: i32,

    /// Chunks kept resident around spawn
    #[arg(long, default_value_t = 6)]
    spawn_radius: i32,

    /// Tile output directory (overrides the settings file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Compositing threads (overrides the settings file)
    #[arg(long)]
    workers: Option<usize>,

    /// Load chunks synchronously instead of waiting for the host
    #[arg(long, default_value_t = false)]
    eager: bool,

    /// Host tick length in milliseconds
    #[arg(long, default_value_t = HOST_TICK_MS)]
    tick_ms: u64,

    /// Render settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Keep running after the initial generation finishes
    #[arg(long, default_value_t = false)]
    interactive: bool,
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let settings_path = args.settings.clone().or_else(default_settings_path);
    let mut settings = match &settings_path {
        Some(path) => load_or_default(path),
        None => Default::default(),
    };
    if let Some(output) = &args.output {
        settings.output_root = output.clone();
    }
    if let Some(workers) = args.workers {
        settings.worker_count = workers.max(1);
    }
    if args.eager {
        settings.load_mode = LoadMode::Eager;
    }

    let world = Arc::new(SimulatedWorld::new(args.world.as_str(), args.seed));
    let r = args.radius.max(1);
    let s = args.spawn_radius.clamp(0, r);
    world.generate_area(ChunkBounds::new(ChunkCoord::new(-r, -r), ChunkCoord::new(r - 1, r - 1)));
    world.load_area(ChunkBounds::new(ChunkCoord::new(-s, -s), ChunkCoord::new(s, s)));
    tracing::info!(
        "World '{}' ready: {} chunks generated, {} resident",
        args.world,
        (2 * r as u64).pow(2),
        world.resident_count()
    );

    let mut scheduler = Scheduler::new(settings, Arc::new(PngTileCompositor));
    scheduler.add_world(world.clone());

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if args.interactive {
        thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let initial = format!("generate {}", args.world);
        println!("{}", run_line(&mut scheduler, &initial, settings_path.as_deref()));

        let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
        let mut edited = false;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(line) = line_rx.recv() => {
                    let line = line.trim();
                    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                        break;
                    }
                    if !line.is_empty() {
                        println!("{}", run_line(&mut scheduler, line, settings_path.as_deref()));
                    }
                    continue;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping");
                    break;
                }
            }

            world.tick();
            let report = scheduler.tick();
            for status in &report.finished {
                println!("{}", status);
            }

            if report.tick % 40 == 0 && !scheduler.is_idle() {
                println!("{}", run_line(&mut scheduler, "status", None));
            }

            if scheduler.is_idle() && !edited {
                // Simulate players changing the world, then pick up just those chunks
                edited = true;
                for x in 0..4 {
                    world.edit_column(
                        ChunkCoord::new(x, 0),
                        8,
                        8,
                        SurfaceColumn {
                            height: 90,
                            block: BlockType::Snow,
                            water_depth: 0,
                        },
                    );
                }
                let changed = format!("generate {} changed", args.world);
                println!("{}", run_line(&mut scheduler, &changed, None));
            } else if scheduler.is_idle() && !args.interactive {
                break;
            }
        }
    });

    for status in scheduler.status() {
        print!("{}", status);
    }
    scheduler.remove_world(&args.world);
    Ok(())
}
