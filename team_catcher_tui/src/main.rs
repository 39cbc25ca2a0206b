use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::{self, File},
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use team_catcher_core::{
    agent::{Agent, ChaserAgent, RandomWalker},
    world::{TickReport, World, WorldConfig, WorldState, load_world_from_string},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout file to load instead of a random placement
    #[arg(short, long, value_name = "LAYOUT_FILE")]
    map: Option<PathBuf>,

    /// JSON world configuration, overrides the size/agents/targets/seed flags
    #[arg(short, long, value_name = "CONFIG_FILE", conflicts_with = "map")]
    config: Option<PathBuf>,

    /// Grid side length, border included
    #[arg(long, default_value_t = 10)]
    size: usize,

    #[arg(long, default_value_t = 3)]
    agents: usize,

    #[arg(long, default_value_t = 3)]
    targets: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Behavior driving every agent
    #[arg(long, value_enum, default_value_t = Policy::Chaser)]
    policy: Policy,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Write logs to this file (filter with RUST_LOG, default info)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Random,
    Chaser,
}

struct App {
    /// The core simulation world.
    world: World,
    /// One behavior per agent, in agent id order.
    behaviors: Vec<Box<dyn Agent>>,
    policy: Policy,
    /// Diagnostics of the last tick.
    last_report: Option<TickReport>,
    /// Flag to control the main loop.
    should_quit: bool,
    paused: bool,
}

impl App {
    fn new(world: World, policy: Policy) -> Self {
        let behaviors = build_behaviors(&world, policy);
        App {
            world,
            behaviors,
            policy,
            last_report: None,
            should_quit: false,
            paused: false,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if self.paused || self.world.is_done() {
            return Ok(());
        }
        let report = self.world.process_turn(&mut self.behaviors)?;
        self.last_report = Some(report);
        Ok(())
    }

    /// Starts a new episode with fresh behaviors.
    fn reset(&mut self) -> Result<()> {
        self.world.reset()?;
        self.behaviors = build_behaviors(&self.world, self.policy);
        self.last_report = None;
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn build_behaviors(world: &World, policy: Policy) -> Vec<Box<dyn Agent>> {
    let base_seed = world
        .config()
        .seed
        .wrapping_add(world.episode().wrapping_mul(1_000));
    world
        .agents()
        .iter()
        .map(|agent| -> Box<dyn Agent> {
            match policy {
                Policy::Random => Box::new(RandomWalker::new(
                    agent.name.clone(),
                    base_seed.wrapping_add(agent.id as u64),
                )),
                Policy::Chaser => Box::new(ChaserAgent::new(agent.name.clone())),
            }
        })
        .collect()
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let world = load_world(&args)?;
    info!("Starting with {:?}, policy {:?}", world.config(), args.policy);

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    let mut app = App::new(world, args.policy);
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state even if the loop failed
    restore_terminal(&mut terminal)?;

    result
}

/// Builds the world from a layout file, a JSON configuration or the command line flags.
fn load_world(args: &Args) -> Result<World> {
    if let Some(path) = &args.map {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Layout file does not exist: {}",
                path.display()
            ));
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading layout {}", path.display()))?;
        return Ok(load_world_from_string(&text, args.seed)?);
    }

    let config: WorldConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => WorldConfig {
            size: args.size,
            nb_agents: args.agents,
            nb_targets: args.targets,
            seed: args.seed,
        },
    };
    let mut world = World::new(config)?;
    world.reset()?;
    Ok(world)
}

/// Logs go to a file only; stderr would draw over the terminal UI.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file =
        File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('r') => app.reset()?,
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the grid
            Constraint::Percentage(20), // Area for agent positions
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    let Some(state) = app.world.state() else {
        return;
    };
    render_map(frame, main_layout[0], state);
    render_agents(frame, main_layout[1], state);
    render_status(frame, main_layout[2], app);
}

/// Renders the projected grid onto the frame. The empty outer ring is drawn as a wall.
fn render_map(frame: &mut Frame, area: Rect, state: &WorldState) {
    let size = state.grid.len();
    let lines: Vec<Line> = state
        .grid
        .iter()
        .enumerate()
        .map(|(row, cells)| {
            let spans: Vec<Span> = cells
                .iter()
                .enumerate()
                .map(|(col, code)| {
                    let border = row == 0 || col == 0 || row + 1 == size || col + 1 == size;
                    match *code {
                        1 => Span::styled("@", Style::default().fg(Color::Blue).bold()),
                        2 => Span::styled("x", Style::default().fg(Color::Red).bold()),
                        _ if border => Span::styled("#", Style::default().fg(Color::DarkGray)),
                        _ => Span::raw("."),
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Team Catcher").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Lists every agent with its position.
fn render_agents(frame: &mut Frame, area: Rect, state: &WorldState) {
    let items: Vec<ListItem> = state
        .agent_positions
        .iter()
        .map(|(name, pos)| {
            ListItem::from(Line::from(vec![
                Span::styled(name.as_str(), Style::default().fg(Color::Blue)),
                Span::raw(format!(" at ({}, {})", pos.row, pos.col)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(list, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let world = &app.world;
    let blocked = app
        .last_report
        .as_ref()
        .map_or(0, |report| report.blocked_moves().count());
    let phase = if world.is_done() {
        "cleared"
    } else if app.paused {
        "paused"
    } else {
        "running"
    };
    let status = format!(
        "Episode {} | tick {} | targets {}/{} | blocked moves {} | {} | q quit, r reset, space pause",
        world.episode(),
        world.tick(),
        world.nb_targets_alive(),
        world.config().nb_targets,
        blocked,
        phase
    );
    let status_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status_text, area);
}
