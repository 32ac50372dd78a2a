use std::sync::Arc;

use skirmish_core::{CellCoord, EntityId, FlowKind, Health, MoveMode, State, Tick};
use skirmish_scheduler::{
    shared, CommandIds, Metadata, ScheduleHandle, SchedulerConfig, Shared, Stage, TickDriver,
};
use skirmish_system_attack::{AttackMetadata, AttackVisitor};
use skirmish_system_chase::{ChaseMetadata, ChaseVisitor};
use skirmish_system_movement::{MoveMetadata, MoveVisitor};
use skirmish_world::{EntityKind, GridPathfinder, Terrain, World};

struct Battlefield {
    world: World,
    ids: CommandIds,
    moves: ScheduleHandle<MoveMetadata>,
    attacks: ScheduleHandle<AttackMetadata>,
    driver: TickDriver,
}

impl Battlefield {
    fn new(terrain: Terrain) -> Self {
        let ids = CommandIds::new();
        let moves = ScheduleHandle::<MoveMetadata>::new();
        let chases = ScheduleHandle::<ChaseMetadata>::new();
        let attacks = ScheduleHandle::<AttackMetadata>::new();
        let config = SchedulerConfig::default()
            .with_order(vec![FlowKind::Move, FlowKind::Chase, FlowKind::Attack])
            .with_parallel(vec![FlowKind::Move]);
        let driver = TickDriver::builder(config.clone())
            .register(Stage::new(
                moves.clone(),
                MoveVisitor::new(GridPathfinder, config.path_budget(), 1),
            ))
            .register(Stage::new(
                chases.clone(),
                ChaseVisitor::from_config(moves.appender(), ids.clone(), &config),
            ))
            .register(Stage::new(
                attacks.clone(),
                AttackVisitor::new(chases.appender(), ids.clone()),
            ))
            .build()
            .expect("driver");
        Self {
            world: World::new(terrain),
            ids,
            moves,
            attacks,
            driver,
        }
    }

    fn spawn(&mut self, kind: EntityKind, column: u32, row: u32) -> EntityId {
        self.world
            .spawn(kind, CellCoord::new(column, row), Tick::ZERO)
            .expect("spawn")
    }

    fn attack(&self, attacker: EntityId, quarry: EntityId) -> Shared<AttackMetadata> {
        let attack = shared(
            AttackMetadata::new(
                &self.world,
                self.ids.next_id(),
                self.driver.now(),
                attacker,
                quarry,
            )
            .expect("attack"),
        );
        self.attacks.schedule(Arc::clone(&attack)).expect("schedule");
        attack
    }

    fn walk(&self, mover: EntityId, destination: CellCoord) {
        let walk = MoveMetadata::new(
            &self.world,
            self.ids.next_id(),
            self.driver.now(),
            mover,
            destination,
            MoveMode::Direct,
        )
        .expect("move");
        self.moves.schedule(shared(walk)).expect("schedule");
    }

    fn status<M: Metadata>(&self, metadata: &Shared<M>) -> State {
        metadata.read().status(&self.world, self.driver.now())
    }
}

#[test]
fn walled_off_target_cancels_attack_through_chase() {
    let terrain = Terrain::open(10, 3).with_blocked([
        CellCoord::new(8, 0),
        CellCoord::new(8, 1),
        CellCoord::new(9, 1),
    ]);
    let mut field = Battlefield::new(terrain);
    let attacker = field.spawn(EntityKind::Soldier, 0, 0);
    let quarry = field.spawn(EntityKind::Soldier, 9, 0);
    let attack = field.attack(attacker, quarry);

    let mut canceled_at = None;
    while field.driver.now() < Tick::new(80) {
        let _ = field.driver.tick(&mut field.world);
        if field.status(&attack) == State::Canceled {
            canceled_at = Some(field.driver.now());
            break;
        }
    }

    let now = canceled_at.expect("attack should cancel once the chase gives up");
    let chase = attack.read().child().cloned().expect("chase child");
    assert_eq!(field.status(&chase), State::Canceled);
    let walk = chase.read().child().cloned().expect("move child");
    assert_eq!(field.status(&walk), State::Canceled);
    assert!(!attack.read().in_range(&field.world, now));
    assert!(field.world.contains(quarry));
    assert_eq!(field.world.position(attacker, now), Some(CellCoord::new(7, 0)));
}

#[test]
fn attacker_closes_in_and_kills_target() {
    let mut field = Battlefield::new(Terrain::open(12, 12));
    let attacker = field.spawn(EntityKind::Soldier, 0, 0);
    let quarry = field.spawn(EntityKind::Archer, 9, 6);
    let attack = field.attack(attacker, quarry);

    let mut dirty_quarry = false;
    while field.driver.now() < Tick::new(120) && field.status(&attack) != State::Finished {
        let report = field.driver.tick(&mut field.world);
        assert_eq!(report.faults().count(), 0);
        dirty_quarry |= report.dirty().contains(quarry);
    }

    assert_eq!(field.status(&attack), State::Finished);
    assert!(!field.world.contains(quarry));
    assert!(dirty_quarry);
}

#[test]
fn newer_attack_order_replaces_older_one() {
    let mut field = Battlefield::new(Terrain::open(6, 6));
    let attacker = field.spawn(EntityKind::Soldier, 0, 0);
    let first_target = field.spawn(EntityKind::Soldier, 5, 5);
    let second_target = field.spawn(EntityKind::Soldier, 0, 5);
    let first = field.attack(attacker, first_target);
    let _ = field.driver.tick(&mut field.world);

    let second = field.attack(attacker, second_target);
    let _ = field.driver.tick(&mut field.world);

    assert_eq!(field.status(&first), State::Canceled);
    assert!(field.status(&second).is_live());
}

#[test]
fn attacker_pursues_again_after_quarry_walks_away() {
    let mut field = Battlefield::new(Terrain::open(30, 3));
    let attacker = field.spawn(EntityKind::Soldier, 0, 0);
    let quarry = field.spawn(EntityKind::Soldier, 5, 0);
    let attack = field.attack(attacker, quarry);

    while field.world.health(quarry, field.driver.now()) == Some(Health::new(10)) {
        let _ = field.driver.tick(&mut field.world);
        assert!(field.driver.now() < Tick::new(40), "first strike never landed");
    }
    let first_chase = attack.read().child().cloned().expect("first chase");
    assert_eq!(field.status(&first_chase), State::Finished);

    field.walk(quarry, CellCoord::new(29, 0));
    let mut chases = vec![first_chase.read().id()];
    while field.status(&attack) != State::Finished {
        let report = field.driver.tick(&mut field.world);
        assert_eq!(report.faults().count(), 0);
        assert_ne!(field.status(&attack), State::Canceled);
        if let Some(chase) = attack.read().child() {
            let id = chase.read().id();
            if !chases.contains(&id) {
                chases.push(id);
            }
        }
        assert!(field.driver.now() < Tick::new(200), "attacker lost track of the quarry");
    }

    assert!(chases.len() > 1, "attack never started a new chase");
    assert_eq!(field.status(&first_chase), State::Finished);
    assert!(!field.world.contains(quarry));
    let column = field
        .world
        .position(attacker, field.driver.now())
        .expect("attacker")
        .column();
    assert!(column >= 27, "attacker stopped at column {column}");
}
