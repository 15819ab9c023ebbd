use crossterm::event::{self, Event, KeyEvent, KeyEventKind, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    size as terminal_size,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::time::Duration;

use crate::tui::app::{App, Mode};
use crate::tui::error::TuiError;
use crate::tui::layout::Layout;
use crate::tui::render::render;
use crate::utils::parse_key_binding;

/// Guard that ensures terminal state is restored even on panic.
/// If the terminal is left in raw mode or the alternate screen, the
/// user's shell is unusable afterwards.
struct TerminalGuard {
    raw_mode_enabled: bool,
    alternate_screen_enabled: bool,
}

impl TerminalGuard {
    fn new() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        Ok(Self {
            raw_mode_enabled: true,
            alternate_screen_enabled: true,
        })
    }

    /// Manually restore terminal state (called on normal exit).
    /// After calling this, the guard does nothing on drop.
    fn restore(&mut self) -> Result<(), TuiError> {
        if self.raw_mode_enabled {
            disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        if self.alternate_screen_enabled {
            execute!(io::stdout(), LeaveAlternateScreen)?;
            self.alternate_screen_enabled = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Ignore errors in drop - we're already in a cleanup path
        if self.raw_mode_enabled {
            let _ = disable_raw_mode();
        }
        if self.alternate_screen_enabled {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }
}

/// Whether a key event matches a key binding string from config.
fn binding_matches(binding: &str, key: &KeyEvent) -> bool {
    match parse_key_binding(binding) {
        Ok(parsed) => {
            key.code == parsed.key_code
                && key.modifiers.contains(KeyModifiers::CONTROL) == parsed.requires_ctrl
        }
        Err(_) => false,
    }
}

pub fn run_event_loop(mut app: App) -> Result<(), TuiError> {
    // Check terminal size before entering the alternate screen, so the
    // error message lands in the normal terminal
    let (width, height) = terminal_size().map_err(TuiError::IoError)?;
    if width < Layout::MIN_WIDTH || height < Layout::MIN_HEIGHT {
        return Err(TuiError::RenderError(format!(
            "Terminal size too small. Current: {}x{}, minimum required: {}x{}.",
            width,
            height,
            Layout::MIN_WIDTH,
            Layout::MIN_HEIGHT
        )));
    }

    let mut guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    loop {
        app.check_status_message_timeout();
        // Periodic refresh keeps the board in step with other devices;
        // blocking store calls happen here, between frames.
        app.maybe_auto_sync();

        terminal.draw(|f| render(f, &mut app))?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut app, key);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    guard.restore()?;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    match app.mode {
        Mode::Browse => handle_browse_key(app, key),
        Mode::AddTask => handle_add_task_key(app, key),
        Mode::ConfirmArchive => handle_confirm_archive_key(app, key),
    }
}

fn handle_browse_key(app: &mut App, key: KeyEvent) {
    let bindings = app.config.key_bindings.clone();

    if binding_matches(&bindings.quit, &key) {
        app.should_quit = true;
    } else if binding_matches(&bindings.new_task, &key) {
        app.input.clear();
        app.mode = Mode::AddTask;
    } else if binding_matches(&bindings.toggle_done, &key) {
        app.toggle_selected_done();
    } else if binding_matches(&bindings.archive, &key) {
        if app.selected_task().is_some() {
            app.mode = Mode::ConfirmArchive;
        }
    } else if binding_matches(&bindings.cancel_task, &key) {
        app.cancel_selected();
    } else if binding_matches(&bindings.prepare_day, &key) {
        app.prepare_day();
    } else if binding_matches(&bindings.refresh, &key) {
        app.sync();
    } else if binding_matches(&bindings.list_down, &key) || key.code == KeyCode::Down {
        app.select_next();
    } else if binding_matches(&bindings.list_up, &key) || key.code == KeyCode::Up {
        app.select_previous();
    } else if binding_matches(&bindings.tab_right, &key) || key.code == KeyCode::Tab {
        app.next_tab();
    } else if binding_matches(&bindings.tab_left, &key) {
        app.previous_tab();
    }
}

fn handle_add_task_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_new_task(),
        KeyCode::Esc => {
            app.input.clear();
            app.mode = Mode::Browse;
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.push(c);
        }
        _ => {}
    }
}

fn handle_confirm_archive_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.archive_selected(),
        _ => app.mode = Mode::Browse,
    }
}
