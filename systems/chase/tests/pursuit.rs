use std::sync::Arc;

use skirmish_core::{CellCoord, FlowKind, MoveMode, State, Tick};
use skirmish_scheduler::{
    shared, CommandIds, Metadata, ScheduleHandle, SchedulerConfig, Stage, TickDriver,
};
use skirmish_system_chase::{ChaseMetadata, ChaseVisitor};
use skirmish_system_movement::{MoveMetadata, MoveVisitor};
use skirmish_world::{EntityKind, GridPathfinder, Terrain, World};

#[test]
fn chaser_catches_up_with_fleeing_quarry() {
    let mut world = World::new(Terrain::open(20, 3));
    let chaser = world
        .spawn(EntityKind::Soldier, CellCoord::new(0, 1), Tick::ZERO)
        .expect("spawn");
    let quarry = world
        .spawn(EntityKind::Soldier, CellCoord::new(8, 1), Tick::ZERO)
        .expect("spawn");

    let ids = CommandIds::new();
    let moves = ScheduleHandle::<MoveMetadata>::new();
    let chases = ScheduleHandle::<ChaseMetadata>::new();
    let config = SchedulerConfig::default()
        .with_order(vec![FlowKind::Move, FlowKind::Chase])
        .with_parallel(vec![FlowKind::Move, FlowKind::Chase]);
    let mut driver = TickDriver::builder(config.clone())
        .register(Stage::new(
            moves.clone(),
            MoveVisitor::from_config(GridPathfinder, &config),
        ))
        .register(Stage::new(
            chases.clone(),
            ChaseVisitor::from_config(moves.appender(), ids.clone(), &config),
        ))
        .build()
        .expect("driver");

    let flight = MoveMetadata::new(
        &world,
        ids.next_id(),
        Tick::ZERO,
        quarry,
        CellCoord::new(19, 1),
        MoveMode::Direct,
    )
    .expect("move");
    moves.schedule(shared(flight)).expect("schedule");
    let chase = shared(
        ChaseMetadata::new(&world, ids.next_id(), Tick::ZERO, chaser, quarry, 1).expect("chase"),
    );
    chases.schedule(Arc::clone(&chase)).expect("schedule");

    while driver.now() < Tick::new(200) {
        let report = driver.tick(&mut world);
        assert_eq!(report.faults().count(), 0);
        if chase.read().status(&world, driver.now()) == State::Finished {
            break;
        }
    }

    assert_eq!(chase.read().status(&world, driver.now()), State::Finished);
    let here = world.position(chaser, driver.now()).expect("chaser");
    let there = world.position(quarry, driver.now()).expect("quarry");
    assert!(here.chebyshev_distance(there) <= 1);
    assert!(chase.read().child().is_some());
}

#[test]
fn stale_dependency_order_is_rejected() {
    let ids = CommandIds::new();
    let moves = ScheduleHandle::<MoveMetadata>::new();
    let config = SchedulerConfig::default()
        .with_order(vec![FlowKind::Chase, FlowKind::Move])
        .with_parallel(Vec::new());

    let result = TickDriver::builder(config.clone())
        .register(Stage::new(
            moves.clone(),
            MoveVisitor::from_config(GridPathfinder, &config),
        ))
        .register(Stage::new(
            ScheduleHandle::new(),
            ChaseVisitor::from_config(moves.appender(), ids, &config),
        ))
        .build();

    assert!(matches!(
        result,
        Err(skirmish_scheduler::ConfigError::StaleDependency {
            flow: FlowKind::Chase,
            dependency: FlowKind::Move,
        })
    ));
}
