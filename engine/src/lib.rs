#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Simulation engine wiring every flow into a single tick driver.
//!
//! The [`Engine`] owns the world, validates client requests and turns them
//! into metadata placed in the matching cache. [`Engine::tick`] advances the
//! simulation by one step.

use skirmish_core::{
    AbilityKind, CellCoord, ClientCommand, ClientRequest, CommandId, EntityId, FlowKind, MoveMode,
    State, Tick, TickId,
};
use skirmish_scheduler::{
    shared, CommandIds, ConfigError, Metadata, ScheduleError, ScheduleHandle, SchedulerConfig,
    Stage, StaleTick, TickDriver, TickReport,
};
use skirmish_system_ability::{AbilityMetadata, AbilityVisitor};
use skirmish_system_attack::{AttackMetadata, AttackVisitor};
use skirmish_system_chase::{ChaseMetadata, ChaseVisitor};
use skirmish_system_movement::{MoveMetadata, MoveVisitor};
use skirmish_system_production::{ProduceMetadata, ProduceVisitor};
use skirmish_world::{EntityKind, GridPathfinder, World, WorldError};
use thiserror::Error;
use tracing::{debug, info};

/// Reasons a client request is rejected before reaching a schedule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The request was issued against a tick outside the lookback window.
    #[error("request issued against stale tick {0}")]
    StaleTick(TickId),
    /// The request names an entity that does not exist.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    /// A move request listed no entities.
    #[error("move request selects no entities")]
    EmptySelection,
    /// The entity cannot carry out commands of the requested flow.
    #[error("entity {entity} cannot take part in {flow}")]
    Unsupported {
        /// Entity named by the request.
        entity: EntityId,
        /// Flow the request asked for.
        flow: FlowKind,
    },
    /// The schedule refused the command.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// The command could not be bound to the world.
    #[error(transparent)]
    World(#[from] WorldError),
}

impl From<StaleTick> for RequestError {
    fn from(stale: StaleTick) -> Self {
        Self::StaleTick(stale.0)
    }
}

/// Owns the world and every flow schedule.
#[derive(Debug)]
pub struct Engine {
    world: World,
    driver: TickDriver,
    ids: CommandIds,
    moves: ScheduleHandle<MoveMetadata>,
    chases: ScheduleHandle<ChaseMetadata>,
    attacks: ScheduleHandle<AttackMetadata>,
    abilities: ScheduleHandle<AbilityMetadata>,
    productions: ScheduleHandle<ProduceMetadata>,
}

impl Engine {
    /// Builds an engine around `world`, registering every flow.
    ///
    /// Fails when the configuration orders or parallelises flows in a way
    /// the driver rejects.
    pub fn new(world: World, config: SchedulerConfig) -> Result<Self, ConfigError> {
        let ids = CommandIds::new();
        let moves = ScheduleHandle::new();
        let chases = ScheduleHandle::new();
        let attacks = ScheduleHandle::new();
        let abilities = ScheduleHandle::new();
        let productions = ScheduleHandle::new();

        let move_visitor = MoveVisitor::from_config(GridPathfinder, &config);
        let chase_visitor = ChaseVisitor::from_config(moves.appender(), ids.clone(), &config);
        let attack_visitor = AttackVisitor::new(chases.appender(), ids.clone());
        let produce_visitor = ProduceVisitor::new(moves.appender(), ids.clone());

        let driver = TickDriver::builder(config)
            .register(Stage::new(moves.clone(), move_visitor))
            .register(Stage::new(chases.clone(), chase_visitor))
            .register(Stage::new(attacks.clone(), attack_visitor))
            .register(Stage::new(abilities.clone(), AbilityVisitor::new()))
            .register(Stage::new(productions.clone(), produce_visitor))
            .build()?;
        info!(
            entities = world.len(),
            order = ?driver.order(),
            "engine ready"
        );

        Ok(Self {
            world,
            driver,
            ids,
            moves,
            chases,
            attacks,
            abilities,
            productions,
        })
    }

    /// Validates a client request and schedules the resulting commands for
    /// the next tick.
    ///
    /// Returns the identifiers assigned to the new commands, one per entity
    /// for move requests.
    pub fn submit(&mut self, request: ClientRequest) -> Result<Vec<CommandId>, RequestError> {
        let _ = self.driver.resolve(request.tick_id)?;
        let issued_at = self.driver.now();
        let ids = match request.command {
            ClientCommand::Move {
                entities,
                destination,
                mode,
            } => self.submit_move(&entities, destination, mode, issued_at)?,
            ClientCommand::Attack { attacker, target } => {
                vec![self.submit_attack(attacker, target, issued_at)?]
            }
            ClientCommand::UseAbility { caster, ability } => {
                vec![self.submit_ability(caster, ability, issued_at)?]
            }
            ClientCommand::Produce { producer, rally } => {
                vec![self.submit_produce(producer, rally, issued_at)?]
            }
        };
        debug!(tick = %issued_at, commands = ids.len(), "client request scheduled");
        Ok(ids)
    }

    /// Simulates one tick.
    pub fn tick(&mut self) -> TickReport {
        self.driver.tick(&mut self.world)
    }

    /// Most recently simulated tick.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.driver.now()
    }

    /// Identifier clients should attach to requests issued now.
    #[must_use]
    pub const fn current_tick_id(&self) -> TickId {
        self.driver.current_tick_id()
    }

    /// Read access to the simulated world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Current state of a command still held by any schedule.
    ///
    /// Commands are forgotten once cleared, one tick after turning terminal.
    #[must_use]
    pub fn status(&self, id: CommandId) -> Option<State> {
        let now = self.driver.now();
        let world = &self.world;
        lookup(&self.moves, id, world, now)
            .or_else(|| lookup(&self.chases, id, world, now))
            .or_else(|| lookup(&self.attacks, id, world, now))
            .or_else(|| lookup(&self.abilities, id, world, now))
            .or_else(|| lookup(&self.productions, id, world, now))
    }

    fn submit_move(
        &self,
        entities: &[EntityId],
        destination: CellCoord,
        mode: MoveMode,
        issued_at: Tick,
    ) -> Result<Vec<CommandId>, RequestError> {
        if entities.is_empty() {
            return Err(RequestError::EmptySelection);
        }
        for entity in entities {
            self.require_capable(*entity, FlowKind::Move, |kind| kind.is_mobile())?;
        }
        let mut scheduled = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = self.ids.next_id();
            let metadata =
                MoveMetadata::new(&self.world, id, issued_at, *entity, destination, mode)?;
            self.moves.schedule(shared(metadata))?;
            scheduled.push(id);
        }
        Ok(scheduled)
    }

    fn submit_attack(
        &self,
        attacker: EntityId,
        target: EntityId,
        issued_at: Tick,
    ) -> Result<CommandId, RequestError> {
        self.require_capable(attacker, FlowKind::Attack, |kind| kind.attack_damage() > 0)?;
        let _ = self.require(target)?;
        let id = self.ids.next_id();
        let metadata = AttackMetadata::new(&self.world, id, issued_at, attacker, target)?;
        self.attacks.schedule(shared(metadata))?;
        Ok(id)
    }

    fn submit_ability(
        &self,
        caster: EntityId,
        ability: AbilityKind,
        issued_at: Tick,
    ) -> Result<CommandId, RequestError> {
        let _ = self.require(caster)?;
        let id = self.ids.next_id();
        let metadata = AbilityMetadata::new(&self.world, id, issued_at, caster, ability)?;
        self.abilities.schedule(shared(metadata))?;
        Ok(id)
    }

    fn submit_produce(
        &self,
        producer: EntityId,
        rally: Option<CellCoord>,
        issued_at: Tick,
    ) -> Result<CommandId, RequestError> {
        let kind = self.require(producer)?;
        let (unit, build_ticks) = kind.production().ok_or(RequestError::Unsupported {
            entity: producer,
            flow: FlowKind::Produce,
        })?;
        if let Some(cell) = rally {
            if !self.world.terrain().contains(cell) {
                return Err(WorldError::OutOfBounds(cell).into());
            }
        }
        let id = self.ids.next_id();
        let metadata = ProduceMetadata::new(
            &self.world,
            id,
            issued_at,
            producer,
            unit,
            build_ticks,
            rally,
        )?;
        self.productions.schedule(shared(metadata))?;
        Ok(id)
    }

    fn require(&self, entity: EntityId) -> Result<EntityKind, RequestError> {
        self.world
            .kind(entity)
            .ok_or(RequestError::UnknownEntity(entity))
    }

    fn require_capable(
        &self,
        entity: EntityId,
        flow: FlowKind,
        capable: impl Fn(EntityKind) -> bool,
    ) -> Result<(), RequestError> {
        if capable(self.require(entity)?) {
            Ok(())
        } else {
            Err(RequestError::Unsupported { entity, flow })
        }
    }
}

fn lookup<M: Metadata>(
    handle: &ScheduleHandle<M>,
    id: CommandId,
    world: &World,
    now: Tick,
) -> Option<State> {
    let metadata = handle.lock().find(id)?;
    let state = metadata.read().status(world, now);
    Some(state)
}
