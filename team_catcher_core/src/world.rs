use std::collections::{HashMap, HashSet};

use log::{debug, info, trace};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

use crate::{
    EntityId, Position,
    agent::Agent,
    map::{Grid, GridError},
};

/// Number of orthogonally adjacent agents needed to capture a target.
pub const CAPTURE_THRESHOLD: usize = 2;

/// Errors raised by the world. Illegal moves are not errors; they are reported in [`TickReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),
    #[error("Agent '{0}' appears more than once in the joint action")]
    DuplicateAgent(String),
    #[error("Invalid action code {0}, expected 0..=4")]
    InvalidAction(u8),
    #[error("The world must be reset before it can be updated")]
    NotReset,
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Content of a grid cell. The discriminants are the stable wire encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Cell {
    #[default]
    Empty = 0,
    Agent = 1,
    Target = 2,
}

impl Cell {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Discrete action of a single agent for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    Noop = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Noop,
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Row/column delta of the move. Up decreases the row.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Action::Noop => (0, 0),
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }
}

impl TryFrom<u8> for Action {
    type Error = WorldError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Action::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(WorldError::InvalidAction(code))
    }
}

/// Construction parameters of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Side length of the square grid, border ring included.
    pub size: usize,
    pub nb_agents: usize,
    pub nb_targets: usize,
    pub seed: u64,
}

impl WorldConfig {
    /// Number of cells inside the border ring, or `None` on overflow.
    pub fn interior_cells(&self) -> Option<usize> {
        let side = self.size.checked_sub(2)?;
        side.checked_mul(side)
    }

    pub fn validate(&self) -> Result<(), WorldError> {
        if self.size < 3 {
            return Err(WorldError::InvalidConfiguration(format!(
                "grid size {} has no interior, need at least 3",
                self.size
            )));
        }
        let interior = self
            .size
            .checked_mul(self.size)
            .and_then(|_| self.interior_cells())
            .ok_or_else(|| {
                WorldError::InvalidConfiguration(format!("grid size {} is too large", self.size))
            })?;
        let needed = self.nb_agents.checked_add(self.nb_targets);
        match needed {
            Some(needed) if needed <= interior => Ok(()),
            _ => Err(WorldError::InvalidConfiguration(format!(
                "{} agents and {} targets do not fit in {} interior cells",
                self.nb_agents, self.nb_targets, interior
            ))),
        }
    }
}

/// Holds the state of an agent within the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub id: EntityId,
    pub name: String,
    pub position: Position,
}

/// A live target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub position: Position,
}

/// Name under which the agent with `id` is addressed in joint actions.
pub fn agent_name(id: EntityId) -> String {
    format!("agent_{id}")
}

/// Ordered per-agent actions for one tick. Agents are resolved in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JointAction {
    entries: Vec<(String, Action)>,
}

impl JointAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, agent: impl Into<String>, action: Action) {
        self.entries.push((agent.into(), action));
    }

    pub fn with(mut self, agent: impl Into<String>, action: Action) -> Self {
        self.push(agent, action);
        self
    }

    /// Builds a joint action from raw action codes, as sent by a training harness.
    pub fn from_codes<I, S>(codes: I) -> Result<Self, WorldError>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        codes
            .into_iter()
            .map(|(agent, code)| Ok((agent.into(), Action::try_from(code)?)))
            .collect::<Result<Vec<_>, WorldError>>()
            .map(|entries| JointAction { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Action)> {
        self.entries
            .iter()
            .map(|(agent, action)| (agent.as_str(), *action))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Action)> for JointAction {
    fn from_iter<I: IntoIterator<Item = (String, Action)>>(iter: I) -> Self {
        JointAction {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Externally observable state, recomputed after every reset and tick.
///
/// Serializes as `{"grid": [[..]], "agent_position": {"agent_1": [row, col], ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldState {
    /// `size x size` cell codes: 0 empty, 1 agent, 2 target.
    pub grid: Vec<Vec<u8>>,
    /// Agent positions ordered by agent id.
    #[serde(rename = "agent_position", serialize_with = "serialize_agent_positions")]
    pub agent_positions: Vec<(String, Position)>,
}

/// Writes the positions as a name -> `[row, col]` map, keeping agent id order.
fn serialize_agent_positions<S>(
    positions: &[(String, Position)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(positions.len()))?;
    for (name, pos) in positions {
        map.serialize_entry(name, &(pos.row, pos.col))?;
    }
    map.end()
}

impl WorldState {
    pub fn position_of(&self, agent: &str) -> Option<Position> {
        self.agent_positions
            .iter()
            .find(|(name, _)| name == agent)
            .map(|(_, position)| *position)
    }

    pub fn cell(&self, pos: Position) -> Option<u8> {
        self.grid.get(pos.row)?.get(pos.col).copied()
    }
}

/// What happened to a single agent's action during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Idle,
    Moved { from: Position, to: Position },
    BlockedByBorder,
    BlockedBy(Cell),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMove {
    pub agent: String,
    pub action: Action,
    pub outcome: MoveOutcome,
}

/// Diagnostics of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub moves: Vec<AgentMove>,
    /// Positions of the targets removed this tick, in scan order.
    pub captured: Vec<Position>,
}

impl TickReport {
    /// Moves that were requested but had no effect.
    pub fn blocked_moves(&self) -> impl Iterator<Item = &AgentMove> {
        self.moves.iter().filter(|m| {
            matches!(
                m.outcome,
                MoveOutcome::BlockedByBorder | MoveOutcome::BlockedBy(_)
            )
        })
    }
}

/// Provides a read-only view of the world relevant to an agent.
#[derive(Debug)]
pub struct WorldView<'a> {
    pub agent: &'a AgentState,
    pub grid: &'a Grid<Cell>,
    pub targets: &'a [Target],
}

#[derive(Debug, Clone)]
struct Layout {
    agents: Vec<Position>,
    targets: Vec<Position>,
}

/// The team catcher game: agents capture targets by standing on two of their orthogonal sides.
pub struct World {
    config: WorldConfig,
    rng: StdRng,
    layout: Option<Layout>,
    grid: Grid<Cell>,
    agents: Vec<AgentState>,
    agent_index: HashMap<String, usize>,
    targets: Vec<Target>,
    targets_alive: usize,
    tick: u64,
    episode: u64,
    state: Option<WorldState>,
}

impl World {
    /// Creates a world without entities. Call [`World::reset`] to start an episode.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        Ok(World {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            layout: None,
            grid: Grid::new(config.size, config.size),
            agents: Vec::new(),
            agent_index: HashMap::new(),
            targets: Vec::new(),
            targets_alive: config.nb_targets,
            tick: 0,
            episode: 0,
            state: None,
        })
    }

    /// Restarts the random stream used for placement.
    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Starts a new episode: wipes the grid and places every agent and target again.
    pub fn reset(&mut self) -> Result<&WorldState, WorldError> {
        self.config.validate()?;
        let fixed = self
            .layout
            .as_ref()
            .map(|layout| (layout.agents.clone(), layout.targets.clone()));
        let (agent_cells, target_cells) = match fixed {
            Some(cells) => cells,
            None => self.random_placement(),
        };

        let size = self.config.size;
        self.grid = Grid::new(size, size);
        for pos in &agent_cells {
            self.grid.set(*pos, Cell::Agent)?;
        }
        for pos in &target_cells {
            self.grid.set(*pos, Cell::Target)?;
        }

        self.agents = agent_cells
            .into_iter()
            .enumerate()
            .map(|(i, position)| AgentState {
                id: i + 1,
                name: agent_name(i + 1),
                position,
            })
            .collect();
        self.agent_index = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, agent)| (agent.name.clone(), i))
            .collect();
        self.targets = target_cells
            .into_iter()
            .map(|position| Target { position })
            .collect();
        self.targets_alive = self.targets.len();
        self.tick = 0;
        self.episode += 1;
        debug!(
            "Episode {} placed {} agents and {} targets on a {}x{} grid",
            self.episode,
            self.agents.len(),
            self.targets.len(),
            size,
            size
        );

        self.capture_targets();
        Ok(self.project())
    }

    /// Draws distinct interior cells: the first `nb_agents` for agents, the next `nb_targets` for targets.
    fn random_placement(&mut self) -> (Vec<Position>, Vec<Position>) {
        let size = self.config.size;
        // Interior cells are enumerated column by column.
        let interior: Vec<Position> = (1..size - 1)
            .flat_map(|col| (1..size - 1).map(move |row| Position::new(row, col)))
            .collect();
        let mut order: Vec<usize> = (0..interior.len()).collect();
        order.shuffle(&mut self.rng);

        let mut picks = order.into_iter().map(|i| interior[i]);
        let agents = picks.by_ref().take(self.config.nb_agents).collect();
        let targets = picks.take(self.config.nb_targets).collect();
        (agents, targets)
    }

    /// Advances one tick: applies every action in order, then removes captured targets.
    ///
    /// The joint action is validated as a whole first, so a rejected tick leaves the world untouched.
    /// Agents missing from the joint action stay in place.
    pub fn update(&mut self, joint_action: &JointAction) -> Result<TickReport, WorldError> {
        if self.state.is_none() {
            return Err(WorldError::NotReset);
        }
        let resolved = self.resolve_joint_action(joint_action)?;

        let moves: Vec<AgentMove> = resolved
            .into_iter()
            .map(|(index, action)| {
                let outcome = self.apply_action(index, action);
                AgentMove {
                    agent: self.agents[index].name.clone(),
                    action,
                    outcome,
                }
            })
            .collect();
        let captured = self.capture_targets();
        self.tick += 1;
        self.project();

        if self.is_done() && !captured.is_empty() {
            info!(
                "Episode {} cleared after {} ticks",
                self.episode, self.tick
            );
        }
        Ok(TickReport {
            tick: self.tick,
            moves,
            captured,
        })
    }

    /// Asks each behavior for its action, in slice order, and plays the resulting tick.
    pub fn process_turn(
        &mut self,
        behaviors: &mut [Box<dyn Agent>],
    ) -> Result<TickReport, WorldError> {
        if self.state.is_none() {
            return Err(WorldError::NotReset);
        }
        let mut joint_action = JointAction::new();
        for behavior in behaviors.iter_mut() {
            let name = behavior.name().to_string();
            let view = self
                .view(&name)
                .ok_or_else(|| WorldError::UnknownAgent(name.clone()))?;
            let action = behavior.get_action(&view);
            joint_action.push(name, action);
        }
        self.update(&joint_action)
    }

    fn resolve_joint_action(
        &self,
        joint_action: &JointAction,
    ) -> Result<Vec<(usize, Action)>, WorldError> {
        let mut seen = HashSet::new();
        joint_action
            .iter()
            .map(|(name, action)| {
                let index = *self
                    .agent_index
                    .get(name)
                    .ok_or_else(|| WorldError::UnknownAgent(name.to_string()))?;
                if !seen.insert(index) {
                    return Err(WorldError::DuplicateAgent(name.to_string()));
                }
                Ok((index, action))
            })
            .collect()
    }

    /// Moves the agent if the destination is an empty interior cell; otherwise does nothing.
    fn apply_action(&mut self, index: usize, action: Action) -> MoveOutcome {
        if action == Action::Noop {
            return MoveOutcome::Idle;
        }
        let from = self.agents[index].position;
        let (dr, dc) = action.offset();
        let to = match from.offset(dr, dc) {
            Some(to) if self.grid.is_interior(to) => to,
            _ => {
                trace!("{} {:?} from {:?}: border", self.agents[index].name, action, from);
                return MoveOutcome::BlockedByBorder;
            }
        };

        match self.grid[to] {
            Cell::Empty => {
                self.grid[to] = Cell::Agent;
                self.grid[from] = Cell::Empty;
                self.agents[index].position = to;
                trace!("{} moved {:?} -> {:?}", self.agents[index].name, from, to);
                MoveOutcome::Moved { from, to }
            }
            occupant => {
                trace!(
                    "{} {:?} from {:?}: blocked by {:?}",
                    self.agents[index].name, action, from, occupant
                );
                MoveOutcome::BlockedBy(occupant)
            }
        }
    }

    /// Runs the capture scan on its own and refreshes the projected state.
    /// Running it twice in a row never captures anything the first run did not.
    pub fn resolve_captures(&mut self) -> Vec<Position> {
        let captured = self.capture_targets();
        if self.state.is_some() {
            self.project();
        }
        captured
    }

    fn capture_targets(&mut self) -> Vec<Position> {
        let captured: Vec<Position> = self
            .grid
            .enumerate()
            .filter(|(_, cell)| **cell == Cell::Target)
            .map(|(pos, _)| pos)
            .filter(|pos| self.agent_neighbors(*pos) >= CAPTURE_THRESHOLD)
            .collect();

        for pos in &captured {
            self.grid[*pos] = Cell::Empty;
            self.targets_alive -= 1;
            info!(
                "Target at ({}, {}) captured, {} left",
                pos.row, pos.col, self.targets_alive
            );
        }
        if !captured.is_empty() {
            self.targets.retain(|t| !captured.contains(&t.position));
        }
        captured
    }

    /// Counts agents on the orthogonal neighbors of `pos`. Diagonals do not count.
    pub fn agent_neighbors(&self, pos: Position) -> usize {
        self.grid
            .orthogonal_neighbors(pos)
            .filter(|p| self.grid[*p] == Cell::Agent)
            .count()
    }

    fn project(&mut self) -> &WorldState {
        let state = WorldState {
            grid: self
                .grid
                .to_rows()
                .into_iter()
                .map(|row| row.into_iter().map(Cell::code).collect())
                .collect(),
            agent_positions: self
                .agents
                .iter()
                .map(|agent| (agent.name.clone(), agent.position))
                .collect(),
        };
        self.state.insert(state)
    }

    /// The projection of the last reset or tick. `None` before the first reset.
    pub fn state(&self) -> Option<&WorldState> {
        self.state.as_ref()
    }

    pub fn nb_targets_alive(&self) -> usize {
        self.targets_alive
    }

    /// True once every target of the current episode has been captured.
    pub fn is_done(&self) -> bool {
        self.state.is_some() && self.targets_alive == 0
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }
    pub fn grid(&self) -> &Grid<Cell> {
        &self.grid
    }
    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }
    pub fn agent(&self, name: &str) -> Option<&AgentState> {
        self.agent_index.get(name).map(|&i| &self.agents[i])
    }
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }
    pub fn tick(&self) -> u64 {
        self.tick
    }
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn view(&self, name: &str) -> Option<WorldView<'_>> {
        Some(WorldView {
            agent: self.agent(name)?,
            grid: &self.grid,
            targets: &self.targets,
        })
    }
}

/// Builds a world from a fixed layout and resets it.
///
/// The layout is a square of whitespace-separated codes: `.` empty, `A` agent, `T` target.
/// Agents are numbered in reading order. Every later [`World::reset`] replays the same layout.
pub fn load_world_from_string(layout: &str, seed: u64) -> Result<World, WorldError> {
    let lines: Vec<&str> = layout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let size = lines.len();
    if size == 0 {
        return Err(WorldError::InvalidConfiguration(
            "Layout is empty.".to_string(),
        ));
    }

    let mut agents = Vec::new();
    let mut targets = Vec::new();
    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != size {
            return Err(WorldError::InvalidConfiguration(format!(
                "Layout must be square: row {} has {} cells, expected {}",
                row,
                tokens.len(),
                size
            )));
        }
        for (col, token) in tokens.iter().enumerate() {
            let pos = Position::new(row, col);
            let cell = match *token {
                "." => continue,
                "A" => Cell::Agent,
                "T" => Cell::Target,
                unknown => {
                    return Err(WorldError::InvalidConfiguration(format!(
                        "Unknown layout code '{}' at ({}, {})",
                        unknown, row, col
                    )));
                }
            };
            if row == 0 || col == 0 || row + 1 == size || col + 1 == size {
                return Err(WorldError::InvalidConfiguration(format!(
                    "{:?} placed on the border at ({}, {})",
                    cell, row, col
                )));
            }
            match cell {
                Cell::Agent => agents.push(pos),
                _ => targets.push(pos),
            }
        }
    }

    let config = WorldConfig {
        size,
        nb_agents: agents.len(),
        nb_targets: targets.len(),
        seed,
    };
    let mut world = World::new(config)?;
    world.layout = Some(Layout { agents, targets });
    world.reset()?;
    Ok(world)
}
