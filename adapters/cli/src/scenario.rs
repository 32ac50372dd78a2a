use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use skirmish_core::{CellCoord, ClientCommand, Tick};
use skirmish_world::{EntityKind, Terrain, World, WorldError};

/// Command script driving the demo battle when no script file is supplied.
const DEMO_SCRIPT: &str = include_str!("demo_script.json");

/// Client command to submit once the simulation reaches a given tick.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub(crate) struct ScriptedCommand {
    /// Tick after which the command is submitted.
    pub(crate) at: u64,
    /// Command forwarded to the engine.
    pub(crate) command: ClientCommand,
}

/// Ordered list of scripted client commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Script {
    commands: Vec<ScriptedCommand>,
}

impl Script {
    /// Loads the built-in demo script.
    pub(crate) fn demo() -> Result<Self> {
        Self::from_json_str(DEMO_SCRIPT).context("built-in demo script is malformed")
    }

    /// Loads a script from a JSON file.
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("failed to parse script {}", path.display()))
    }

    fn from_json_str(json: &str) -> Result<Self> {
        let mut commands: Vec<ScriptedCommand> = serde_json::from_str(json)?;
        commands.sort_by_key(|scripted| scripted.at);
        Ok(Self { commands })
    }

    /// Commands due right after `tick`, in script order.
    pub(crate) fn due(&self, tick: Tick) -> impl Iterator<Item = &ClientCommand> + '_ {
        self.commands
            .iter()
            .filter(move |scripted| scripted.at == tick.get())
            .map(|scripted| &scripted.command)
    }
}

/// Builds the demo battlefield: two soldiers, an archer behind a wall and a
/// barracks.
pub(crate) fn demo_world() -> Result<World, WorldError> {
    let wall = (2..6).map(|row| CellCoord::new(8, row));
    let mut world = World::new(Terrain::open(12, 8).with_blocked(wall));
    let roster = [
        (EntityKind::Soldier, CellCoord::new(1, 1)),
        (EntityKind::Soldier, CellCoord::new(1, 4)),
        (EntityKind::Archer, CellCoord::new(10, 3)),
        (EntityKind::Barracks, CellCoord::new(2, 6)),
    ];
    for (kind, cell) in roster {
        let _ = world.spawn(kind, cell, Tick::ZERO)?;
    }
    Ok(world)
}
