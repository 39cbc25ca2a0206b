use proptest::prelude::*;
use team_catcher_core::{
    Position,
    world::{Action, Cell, JointAction, MoveOutcome, World, WorldConfig, agent_name},
};

fn world_config() -> impl Strategy<Value = WorldConfig> {
    (3usize..10).prop_flat_map(|size| {
        let interior = (size - 2) * (size - 2);
        (0..=interior).prop_flat_map(move |nb_agents| {
            (0..=interior - nb_agents, any::<u64>()).prop_map(move |(nb_targets, seed)| {
                WorldConfig {
                    size,
                    nb_agents,
                    nb_targets,
                    seed,
                }
            })
        })
    })
}

fn joint_action(nb_agents: usize, codes: &[u8]) -> JointAction {
    (1..=nb_agents)
        .zip(codes.iter().cycle())
        .map(|(id, code)| (agent_name(id), Action::ALL[usize::from(*code) % 5]))
        .collect()
}

fn occupied(world: &World) -> Vec<(Position, Cell)> {
    world
        .grid()
        .enumerate()
        .filter(|(_, cell)| **cell != Cell::Empty)
        .map(|(pos, cell)| (pos, *cell))
        .collect()
}

proptest! {
    #[test]
    fn reset_places_every_entity_once(config in world_config()) {
        let mut world = World::new(config).unwrap();
        world.reset().unwrap();

        let cells = occupied(&world);
        let agents = cells.iter().filter(|(_, c)| *c == Cell::Agent).count();
        prop_assert_eq!(agents, config.nb_agents);
        prop_assert_eq!(cells.len(), config.nb_agents + world.nb_targets_alive());
        prop_assert!(cells.iter().all(|(p, _)| world.grid().is_interior(*p)));
        if config.nb_agents < 2 {
            prop_assert_eq!(world.nb_targets_alive(), config.nb_targets);
        }
        for agent in world.agents() {
            prop_assert_eq!(world.grid()[agent.position], Cell::Agent);
        }
    }

    #[test]
    fn ticks_keep_the_grid_consistent(
        config in world_config(),
        ticks in prop::collection::vec(prop::collection::vec(0u8..5, 1..6), 1..25),
    ) {
        let mut world = World::new(config).unwrap();
        world.reset().unwrap();
        let mut alive = world.nb_targets_alive();

        for codes in &ticks {
            let report = world.update(&joint_action(config.nb_agents, codes)).unwrap();
            prop_assert_eq!(alive - world.nb_targets_alive(), report.captured.len());
            prop_assert!(world.nb_targets_alive() <= alive);
            alive = world.nb_targets_alive();

            let cells = occupied(&world);
            prop_assert_eq!(cells.len(), config.nb_agents + alive);
            prop_assert_eq!(world.targets().len(), alive);
            for target in world.targets() {
                prop_assert_eq!(world.grid()[target.position], Cell::Target);
                prop_assert!(world.agent_neighbors(target.position) < 2);
            }
            for agent in world.agents() {
                prop_assert!(world.grid().is_interior(agent.position));
                prop_assert_eq!(world.grid()[agent.position], Cell::Agent);
            }
            let state = world.state().unwrap();
            for (name, pos) in &state.agent_positions {
                prop_assert_eq!(world.agent(name).unwrap().position, *pos);
            }
        }
    }

    #[test]
    fn blocked_moves_never_change_position(
        config in world_config().prop_filter("needs agents", |c| c.nb_agents > 0),
        codes in prop::collection::vec(0u8..5, 1..6),
    ) {
        let mut world = World::new(config).unwrap();
        world.reset().unwrap();
        let before: Vec<Position> = world.agents().iter().map(|a| a.position).collect();

        let report = world.update(&joint_action(config.nb_agents, &codes)).unwrap();
        for (i, mv) in report.moves.iter().enumerate() {
            let after = world.agents()[i].position;
            match mv.outcome {
                MoveOutcome::Moved { from, to } => {
                    prop_assert_eq!(from, before[i]);
                    prop_assert_eq!(to, after);
                }
                _ => prop_assert_eq!(after, before[i]),
            }
        }
    }

    #[test]
    fn same_seed_same_episodes(config in world_config()) {
        let mut a = World::new(config).unwrap();
        let mut b = World::new(config).unwrap();
        for _ in 0..3 {
            let left = a.reset().unwrap().clone();
            let right = b.reset().unwrap().clone();
            prop_assert_eq!(left, right);
        }
    }
}

#[test]
fn state_serializes_with_cell_codes() {
    let mut world = team_catcher_core::world::load_world_from_string(
        ". . . .\n. A A .\n. T . .\n. . . .",
        0,
    )
    .unwrap();
    let state = world.reset().unwrap();
    let json = serde_json::to_value(state).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "grid": [[0, 0, 0, 0], [0, 1, 1, 0], [0, 2, 0, 0], [0, 0, 0, 0]],
            "agent_position": { "agent_1": [1, 1], "agent_2": [1, 2] },
        })
    );
    assert!(json.get("agent_position").is_some_and(|v| v.is_object()));
}

#[test]
fn agent_positions_serialize_in_id_order() {
    let mut world = World::new(WorldConfig {
        size: 6,
        nb_agents: 12,
        nb_targets: 0,
        seed: 1,
    })
    .unwrap();
    let text = serde_json::to_string(world.reset().unwrap()).unwrap();
    let offsets: Vec<usize> = (1..=12)
        .map(|id| text.find(&format!("\"{}\":[", agent_name(id))).unwrap())
        .collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{text}");
}

#[test]
fn config_loads_from_json() {
    let config: WorldConfig =
        serde_json::from_str(r#"{"size": 7, "nb_agents": 3, "nb_targets": 2, "seed": 5}"#).unwrap();
    let mut world = World::new(config).unwrap();
    world.reset().unwrap();
    assert_eq!(world.agents().len(), 3);
    assert_eq!(world.nb_targets_alive(), 2);
}
