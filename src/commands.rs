//! Text command surface for operators.
//!
//! Each command maps onto one scheduler operation and produces a
//! human-readable reply.

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::core::Region;
use crate::render::{ChunkGeneratorType, JobId, Scheduler};
use crate::utils::settings::load_settings;

pub const USAGE: &str = "\
commands:
  generate <world> [full|changed]  start a map generation job
  render <world> <rx> <rz>         render one region
  cancel <job-id>                  cancel a running job
  status [world]                   show running and recent jobs
  reload                           re-read render settings
  help                             show this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate {
        world: String,
        kind: ChunkGeneratorType,
    },
    Render {
        world: String,
        rx: i32,
        rz: i32,
    },
    Cancel(JobId),
    Status(Option<String>),
    Reload,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("unknown generation type '{0}', expected full or changed")]
    InvalidType(String),

    #[error("region {0},{1} is outside the world coordinate range")]
    RegionOutOfRange(i32, i32),
}

fn parse_number<T: FromStr>(token: &str) -> Result<T, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("generate", [world]) => Ok(Command::Generate {
                world: world.to_string(),
                kind: ChunkGeneratorType::Full,
            }),
            ("generate", [world, kind]) => Ok(Command::Generate {
                world: world.to_string(),
                kind: kind
                    .parse()
                    .map_err(|_| CommandError::InvalidType(kind.to_string()))?,
            }),
            ("generate", _) => Err(CommandError::Usage("generate <world> [full|changed]")),
            ("render", [world, rx, rz]) => {
                let (rx, rz) = (parse_number(rx)?, parse_number(rz)?);
                if Region::try_from_index(*world, rx, rz).is_none() {
                    return Err(CommandError::RegionOutOfRange(rx, rz));
                }
                Ok(Command::Render {
                    world: world.to_string(),
                    rx,
                    rz,
                })
            }
            ("render", _) => Err(CommandError::Usage("render <world> <rx> <rz>")),
            ("cancel", [id]) => {
                let id = id.strip_prefix('#').unwrap_or(*id);
                Ok(Command::Cancel(JobId(parse_number(id)?)))
            }
            ("cancel", _) => Err(CommandError::Usage("cancel <job-id>")),
            ("status", []) => Ok(Command::Status(None)),
            ("status", [world]) => Ok(Command::Status(Some(world.to_string()))),
            ("status", _) => Err(CommandError::Usage("status [world]")),
            ("reload", []) => Ok(Command::Reload),
            ("help", _) => Ok(Command::Help),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Run one command and describe the outcome
pub fn execute(
    scheduler: &mut Scheduler,
    command: Command,
    settings_path: Option<&Path>,
) -> String {
    match command {
        Command::Generate { world, kind } => match scheduler.start_generation(&world, kind) {
            Ok(handle) => format!("Started {} generation {} for '{}'", kind, handle.id, world),
            Err(e) => format!("Cannot start generation: {}", e),
        },
        Command::Render { world, rx, rz } => {
            let Some(region) = Region::try_from_index(world.as_str(), rx, rz) else {
                return CommandError::RegionOutOfRange(rx, rz).to_string();
            };
            match scheduler.start_region_render(region) {
                Ok(handle) => {
                    format!("Rendering region {},{} of '{}' as {}", rx, rz, world, handle.id)
                }
                Err(e) => format!("Cannot start render: {}", e),
            }
        }
        Command::Cancel(id) => match scheduler.cancel(id) {
            Ok(status) => format!("Cancelled: {}", status),
            Err(e) => format!("Cannot cancel: {}", e),
        },
        Command::Status(Some(world)) => match scheduler.world_status(&world) {
            Some(status) => status.to_string(),
            None => format!("No world named '{}'", world),
        },
        Command::Status(None) => {
            let worlds = scheduler.status();
            if worlds.is_empty() {
                return "No worlds registered".to_string();
            }
            let mut out = String::new();
            for status in worlds {
                let _ = writeln!(out, "{}", status);
            }
            out.trim_end().to_string()
        }
        Command::Reload => {
            let Some(path) = settings_path else {
                return "No settings file configured".to_string();
            };
            match load_settings(path) {
                Ok(settings) => {
                    scheduler.apply_settings(settings);
                    format!("Reloaded render settings from {}", path.display())
                }
                Err(e) => format!("Keeping current settings: {}", e),
            }
        }
        Command::Help => USAGE.to_string(),
    }
}

/// Parse and run one line of operator input
pub fn run_line(scheduler: &mut Scheduler, line: &str, settings_path: Option<&Path>) -> String {
    match line.parse::<Command>() {
        Ok(command) => execute(scheduler, command, settings_path),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkBounds, ChunkCoord};
    use crate::render::{CompositeError, CompositeRequest, TileCompositor};
    use crate::utils::settings::{RenderSettings, save_settings};
    use crate::world::SimulatedWorld;
    use std::sync::Arc;

    struct Discard;

    impl TileCompositor for Discard {
        fn composite(&self, _request: &CompositeRequest) -> Result<(), CompositeError> {
            Ok(())
        }
    }

    fn scheduler() -> Scheduler {
        let world = Arc::new(SimulatedWorld::new("overworld", 3));
        world.load_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(3, 3)));
        let mut scheduler = Scheduler::new(RenderSettings::default(), Arc::new(Discard));
        scheduler.add_world(world);
        scheduler
    }

    #[test]
    fn parses_each_command() {
        assert_eq!(
            "generate overworld".parse::<Command>(),
            Ok(Command::Generate {
                world: "overworld".into(),
                kind: ChunkGeneratorType::Full
            })
        );
        assert_eq!(
            "generate nether changed".parse::<Command>(),
            Ok(Command::Generate {
                world: "nether".into(),
                kind: ChunkGeneratorType::Changed
            })
        );
        assert_eq!(
            "render overworld -1 2".parse::<Command>(),
            Ok(Command::Render {
                world: "overworld".into(),
                rx: -1,
                rz: 2
            })
        );
        assert_eq!("cancel #7".parse::<Command>(), Ok(Command::Cancel(JobId(7))));
        assert_eq!("STATUS".parse::<Command>(), Ok(Command::Status(None)));
        assert_eq!("reload".parse::<Command>(), Ok(Command::Reload));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!(
            "render overworld x 0".parse::<Command>(),
            Err(CommandError::InvalidNumber("x".into()))
        );
        assert_eq!(
            "generate overworld sideways".parse::<Command>(),
            Err(CommandError::InvalidType("sideways".into()))
        );
        assert!(matches!("cancel".parse::<Command>(), Err(CommandError::Usage(_))));
        assert_eq!(
            "render overworld 67108864 0".parse::<Command>(),
            Err(CommandError::RegionOutOfRange(67108864, 0))
        );
        assert_eq!(
            "render overworld 0 -67108865".parse::<Command>(),
            Err(CommandError::RegionOutOfRange(0, -67108865))
        );
        assert!("render overworld 67108863 -67108864".parse::<Command>().is_ok());
        assert!(matches!("teleport".parse::<Command>(), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn generate_twice_reports_already_running() {
        let mut scheduler = scheduler();
        let first = run_line(&mut scheduler, "generate overworld", None);
        assert!(first.starts_with("Started full generation #1"));
        let second = run_line(&mut scheduler, "generate overworld changed", None);
        assert!(second.contains("already running"), "{}", second);
    }

    #[test]
    fn render_cancel_and_status() {
        let mut scheduler = scheduler();
        assert!(run_line(&mut scheduler, "render overworld 0 0", None).contains("#1"));
        assert!(run_line(&mut scheduler, "status overworld", None).contains("render"));
        assert!(run_line(&mut scheduler, "cancel 1", None).starts_with("Cancelled"));
        assert!(run_line(&mut scheduler, "cancel 1", None).contains("no job with id"));
        assert!(run_line(&mut scheduler, "status nether", None).contains("No world"));
        assert!(run_line(&mut scheduler, "render nether 0 0", None).contains("Cannot start"));
    }

    #[test]
    fn out_of_range_region_is_refused_without_starting_a_job() {
        let mut scheduler = scheduler();
        let reply = execute(
            &mut scheduler,
            Command::Render {
                world: "overworld".into(),
                rx: i32::MAX,
                rz: 0,
            },
            None,
        );
        assert!(reply.contains("outside the world coordinate range"), "{}", reply);
        assert_eq!(scheduler.world_status("overworld").unwrap().active_count(), 0);
        assert!(run_line(&mut scheduler, "render overworld -67108865 0", None).contains("outside"));
    }

    #[test]
    fn reload_applies_saved_settings() {
        let mut scheduler = scheduler();
        assert_eq!(run_line(&mut scheduler, "reload", None), "No settings file configured");

        let path = std::env::temp_dir()
            .join(format!("worldmap-commands-{}", std::process::id()))
            .join("settings.bin");
        let settings = RenderSettings {
            max_chunks_per_tick: 3,
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();

        let reply = run_line(&mut scheduler, "reload", Some(&path));
        assert!(reply.starts_with("Reloaded"), "{}", reply);
        assert_eq!(scheduler.settings().max_chunks_per_tick, 3);
        let _ = std::fs::remove_file(&path);
    }
}
