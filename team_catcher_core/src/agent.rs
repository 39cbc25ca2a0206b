use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Position,
    world::{Action, Cell, WorldView},
};

/// Trait defining the behavior of an agent.
/// Agents decide which action to take based on the WorldView.
pub trait Agent {
    /// Returns the name the agent is addressed by, e.g. `agent_1`.
    fn name(&self) -> &str;

    /// Determines the action the agent wants to perform based on its view of the world.
    fn get_action(&mut self, view: &WorldView) -> Action;
}

/// A simple agent that picks one of the five actions uniformly at random.
#[derive(Debug)]
pub struct RandomWalker {
    name: String,
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_action(&mut self, _view: &WorldView) -> Action {
        Action::ALL[self.rng.random_range(0..Action::ALL.len())]
    }
}

/// A greedy agent that heads for the closest free side of any live target and waits there
/// for a partner.
#[derive(Debug)]
pub struct ChaserAgent {
    name: String,
}

impl ChaserAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Free interior cells orthogonally adjacent to a live target. The agent's own cell counts as free.
    fn stations(view: &WorldView) -> Vec<Position> {
        let here = view.agent.position;
        view.targets
            .iter()
            .flat_map(|target| view.grid.orthogonal_neighbors(target.position))
            .filter(|p| view.grid.is_interior(*p))
            .filter(|p| *p == here || view.grid[*p] == Cell::Empty)
            .collect()
    }
}

impl Agent for ChaserAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_action(&mut self, view: &WorldView) -> Action {
        let here = view.agent.position;
        let stations = Self::stations(view);
        if stations.contains(&here) {
            return Action::Noop;
        }
        let Some(goal) = stations
            .into_iter()
            .min_by_key(|station| here.manhattan_distance(*station))
        else {
            return Action::Noop;
        };

        let distance = here.manhattan_distance(goal);
        Action::ALL
            .into_iter()
            .filter(|action| *action != Action::Noop)
            .find(|action| {
                let (dr, dc) = action.offset();
                here.offset(dr, dc).is_some_and(|next| {
                    view.grid.is_interior(next)
                        && view.grid[next] == Cell::Empty
                        && next.manhattan_distance(goal) < distance
                })
            })
            .unwrap_or(Action::Noop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{JointAction, load_world_from_string};

    #[test]
    fn random_walker_is_reproducible() {
        let world = load_world_from_string(". . .\n. A .\n. . .", 0).unwrap();
        let view = world.view("agent_1").unwrap();
        let mut a = RandomWalker::new("agent_1", 9);
        let mut b = RandomWalker::new("agent_1", 9);
        let left: Vec<Action> = (0..20).map(|_| a.get_action(&view)).collect();
        let right: Vec<Action> = (0..20).map(|_| b.get_action(&view)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn chaser_steps_towards_target_side() {
        let layout = "
            . . . . . .
            . A . . . .
            . . . . . .
            . . . T . .
            . . . . . .
            . . . . . .
        ";
        let world = load_world_from_string(layout, 0).unwrap();
        let mut chaser = ChaserAgent::new("agent_1");
        // closest stations are (2,3) and (3,2), both 3 steps away; (2,3) is scanned first
        assert_eq!(chaser.get_action(&world.view("agent_1").unwrap()), Action::Down);
    }

    #[test]
    fn chaser_waits_on_station() {
        let layout = "
            . . . . .
            . A . . .
            . T . . .
            . . . . .
            . . . . .
        ";
        let world = load_world_from_string(layout, 0).unwrap();
        let mut chaser = ChaserAgent::new("agent_1");
        assert_eq!(chaser.get_action(&world.view("agent_1").unwrap()), Action::Noop);
    }

    #[test]
    fn two_chasers_clear_a_target() {
        let layout = "
            . . . . . . .
            . A . . . . .
            . . . . . . .
            . . . T . . .
            . . . . . . .
            . . . . . A .
            . . . . . . .
        ";
        let mut world = load_world_from_string(layout, 0).unwrap();
        let mut behaviors: Vec<Box<dyn Agent>> = vec![
            Box::new(ChaserAgent::new("agent_1")),
            Box::new(ChaserAgent::new("agent_2")),
        ];
        for _ in 0..10 {
            if world.is_done() {
                break;
            }
            world.process_turn(&mut behaviors).unwrap();
        }
        assert!(world.is_done());
        assert!(world.tick() <= 10);
        assert!(world.update(&JointAction::new()).unwrap().captured.is_empty());
    }
}
