use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, terminal};
use indoc::indoc;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, List, ListItem, Paragraph};
use tracing::{Level, info};

use focus_wm::drivers::InputDriver;
use focus_wm::drivers::console::ConsoleInputDriver;
use focus_wm::drivers::keyboard::key_events;
use focus_wm::focus::KeyStroke;
use focus_wm::log_buffer::{
    LogBufferHandle, global_log_buffer, install_panic_hook, set_global_log_buffer,
    take_panic_pending,
};
use focus_wm::{
    ComponentId, ComponentTree, Desktop, FocusConfig, MenuBar, NativeFocusEvent, NativeId,
    RecordingPeer, tracing_sub,
};

const EDITOR_NATIVE: NativeId = NativeId(1);
const PALETTE_NATIVE: NativeId = NativeId(2);
const EDITOR_PROXY: NativeId = NativeId(100);

#[derive(Parser, Debug)]
#[command(
    name = "focus-trace",
    version,
    about = "Drive keyboard focus through a demo component hierarchy.",
    after_help = indoc! {"
        Key script tokens (space separated):
          tab, shift-tab, ctrl-tab, ctrl-shift-tab   traversal keys
          ctrl-s, ctrl-q                             menu shortcuts of the editor frame
          palette, editor                            native focus moves to that window
          any single character                       typed into the focus owner

        Example:
          focus-trace --keys \"tab tab x palette editor shift-tab\"
    "}
)]
struct Cli {
    /// Scripted key sequence to run instead of the default tour.
    #[arg(long, value_name = "SCRIPT")]
    keys: Option<String>,

    /// Do not descend into nested focus cycle roots while tabbing.
    #[arg(long)]
    no_down_cycle: bool,

    /// Take keys from the terminal and show focus live.
    #[arg(long)]
    interactive: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

const DEFAULT_SCRIPT: &str = "tab tab tab tab x shift-tab palette editor ctrl-s";

struct Demo {
    desktop: Desktop,
    editor: ComponentId,
    quit: Arc<AtomicBool>,
    commands: Arc<parking_lot::Mutex<Vec<String>>>,
}

fn build_demo(config: FocusConfig) -> focus_wm::Result<Demo> {
    let mut tree = ComponentTree::new();
    let editor = tree.add_frame("editor");
    let toolbar = tree.add_container(editor, "toolbar")?;
    tree.add_component(toolbar, "open")?;
    tree.add_component(toolbar, "save")?;
    let form = tree.add_container(editor, "form")?;
    tree.set_focus_cycle_root(form, true)?;
    tree.add_component(form, "name")?;
    tree.add_component(form, "email")?;
    tree.add_component(editor, "notes")?;

    let palette = tree.add_window("palette", editor)?;
    tree.add_component(palette, "search")?;

    tree.set_native_id(editor, EDITOR_NATIVE)?;
    tree.set_native_id(palette, PALETTE_NATIVE)?;
    tree.set_focus_proxy(editor, EDITOR_PROXY)?;

    let mut menu = MenuBar::new();
    menu.add_shortcut(
        KeyStroke::pressed(KeyCode::Char('s'), KeyModifiers::CONTROL),
        "save",
    );
    menu.add_shortcut(
        KeyStroke::pressed(KeyCode::Char('q'), KeyModifiers::CONTROL),
        "quit",
    );
    tree.set_menu_bar(editor, menu)?;

    let quit = Arc::new(AtomicBool::new(false));
    let commands = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let quit = quit.clone();
        let commands = commands.clone();
        tree.add_menu_listener(editor, move |command: &str| {
            if command == "quit" {
                quit.store(true, Ordering::SeqCst);
            }
            commands.lock().push(command.to_string());
        })?;
    }

    let desktop = Desktop::with_config(tree, RecordingPeer::new(), config);
    desktop.native_focus(NativeFocusEvent::gained(EDITOR_NATIVE, None));
    desktop.pump();
    Ok(Demo {
        desktop,
        editor,
        quit,
        commands,
    })
}

enum Step {
    Key(KeyEvent),
    Native(NativeId, NativeId),
}

fn parse_token(token: &str) -> Result<Step, String> {
    match token {
        "tab" => key(KeyCode::Tab, KeyModifiers::NONE),
        "shift-tab" => key(KeyCode::BackTab, KeyModifiers::NONE),
        "ctrl-tab" => key(KeyCode::Tab, KeyModifiers::CONTROL),
        "ctrl-shift-tab" => key(KeyCode::BackTab, KeyModifiers::CONTROL),
        "palette" => Ok(Step::Native(PALETTE_NATIVE, EDITOR_NATIVE)),
        "editor" => Ok(Step::Native(EDITOR_NATIVE, PALETTE_NATIVE)),
        other => {
            if let Some(rest) = other.strip_prefix("ctrl-")
                && let Some(c) = single_char(rest)
            {
                return key(KeyCode::Char(c), KeyModifiers::CONTROL);
            }
            match single_char(other) {
                Some(c) => key(KeyCode::Char(c), KeyModifiers::NONE),
                None => Err(format!("unknown key token `{other}`")),
            }
        }
    }
}

fn key(code: KeyCode, mods: KeyModifiers) -> Result<Step, String> {
    Ok(Step::Key(KeyEvent::new(code, mods)))
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn apply_step(demo: &Demo, step: &Step) {
    match step {
        Step::Key(key) => {
            for event in key_events(demo.editor, key) {
                demo.desktop.post_event(event);
            }
        }
        Step::Native(gained, lost) => {
            demo.desktop
                .native_focus(NativeFocusEvent::lost(*lost, Some(*gained)));
            demo.desktop
                .native_focus(NativeFocusEvent::gained(*gained, Some(*lost)));
        }
    }
    demo.desktop.pump();
}

fn describe(desktop: &Desktop, id: Option<ComponentId>) -> String {
    match id {
        Some(id) => desktop.with_tree(|tree| tree.name(id).to_string()),
        None => "-".to_string(),
    }
}

fn status_line(desktop: &Desktop) -> String {
    format!(
        "owner={} window={} active={}",
        describe(desktop, desktop.focus_owner()),
        describe(desktop, desktop.focused_window()),
        describe(desktop, desktop.active_window()),
    )
}

fn run_script(demo: &Demo, script: &str) -> io::Result<()> {
    println!("{:>16}  {}", "start", status_line(&demo.desktop));
    for token in script.split_whitespace() {
        let step = parse_token(token).map_err(io::Error::other)?;
        apply_step(demo, &step);
        println!("{:>16}  {}", token, status_line(&demo.desktop));
    }
    let commands = demo.commands.lock();
    if !commands.is_empty() {
        println!("menu commands: {}", commands.join(", "));
    }
    Ok(())
}

fn run_interactive(demo: &Demo) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    terminal::enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let mut driver = ConsoleInputDriver::new();

    let result = interactive_loop(demo, &mut terminal, &mut driver);

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn interactive_loop<D: InputDriver>(
    demo: &Demo,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    driver: &mut D,
) -> io::Result<()> {
    let mut in_palette = false;
    while !demo.quit.load(Ordering::SeqCst) {
        draw(demo, terminal)?;
        if !driver.poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = driver.read()? else {
            continue;
        };
        let step = match key.code {
            KeyCode::Esc => break,
            KeyCode::F(2) => {
                in_palette = !in_palette;
                if in_palette {
                    Step::Native(PALETTE_NATIVE, EDITOR_NATIVE)
                } else {
                    Step::Native(EDITOR_NATIVE, PALETTE_NATIVE)
                }
            }
            _ => Step::Key(key),
        };
        apply_step(demo, &step);
    }
    Ok(())
}

fn draw(demo: &Demo, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    let owner = demo.desktop.focus_owner();
    let rows: Vec<ListItem> = demo.desktop.with_tree(|tree| {
        tree.ids()
            .map(|id| {
                let depth = std::iter::successors(tree.parent(id), |p| tree.parent(*p)).count();
                let kind = tree.kind(id).map(|k| format!("{k:?}")).unwrap_or_default();
                let label = format!("{}{} [{}]", "  ".repeat(depth), tree.name(id), kind);
                let style = if Some(id) == owner {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(label)).style(style)
            })
            .collect()
    });
    let status = status_line(&demo.desktop);
    terminal
        .draw(move |frame| {
            let [body, footer] =
                Layout::vertical([Constraint::Min(1), Constraint::Length(3)]).areas(frame.area());
            frame.render_widget(
                List::new(rows).block(Block::bordered().title("components")),
                body,
            );
            frame.render_widget(
                Paragraph::new(format!("{status}  |  F2 palette, Esc quit"))
                    .block(Block::bordered()),
                footer,
            );
        })
        .map(|_| ())
        .map_err(|err| io::Error::other(err.to_string()))
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    if cli.interactive {
        // Keep log output off the alternate screen.
        set_global_log_buffer(LogBufferHandle::default());
        install_panic_hook();
    }
    tracing_sub::init_with_level(cli.log_level);

    let config = FocusConfig::default().with_implicit_down_cycle_traversal(!cli.no_down_cycle);
    let demo = build_demo(config).map_err(io::Error::other)?;
    info!(owner = ?demo.desktop.focus_owner(), "demo ready");

    let result = if cli.interactive {
        run_interactive(&demo)
    } else {
        run_script(&demo, cli.keys.as_deref().unwrap_or(DEFAULT_SCRIPT))
    };
    demo.desktop.close();
    if take_panic_pending()
        && let Some(log) = global_log_buffer()
    {
        for line in log.lines() {
            eprintln!("{line}");
        }
    }
    result
}
