use ratatui::Frame;
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Tabs};

use crate::models::Task;
use crate::tui::app::{App, Mode};
use crate::tui::layout::Layout;

pub fn render(f: &mut Frame, app: &mut App) {
    let layout = Layout::calculate(f.area(), app.mode == Mode::AddTask);

    // Outer border with the app name centered in the top border
    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title(" bujo ")
        .title_alignment(Alignment::Center);
    f.render_widget(outer_block, f.area());

    render_context_tabs(f, app, &layout);
    render_task_list(f, app, &layout);

    if app.mode == Mode::AddTask {
        let input = Paragraph::new(app.input.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title("New task (Enter: save, Esc: cancel)"),
        );
        f.render_widget(input, layout.input_area);
    }

    render_status_bar(f, app, &layout);
}

fn render_context_tabs(f: &mut Frame, app: &App, layout: &Layout) {
    let titles: Vec<Line> = app
        .contexts
        .iter()
        .map(|c| Line::from(c.name.as_str()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(app.tab_index)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, layout.tabs_area);
}

fn render_task_list(f: &mut Frame, app: &mut App, layout: &Layout) {
    let today = chrono::Local::now().date_naive();
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| ListItem::new(task_line(task, today)))
        .collect();

    let title = match app.selected_context() {
        Some(context) => format!(" {} · {} open ", context.name, app.tasks.len()),
        None => " No contexts ".to_string(),
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, layout.list_area, &mut app.list_state);
}

/// One list row: bullet, title, staleness marker, due date (red when
/// overdue). Owns its content so the list can be rendered statefully
/// against the app's list state.
fn task_line(task: &Task, today: chrono::NaiveDate) -> Line<'static> {
    let mut spans = vec![Span::raw("• "), Span::raw(task.title.clone())];

    if task.priority != 0 {
        spans.push(Span::styled(
            format!("  !{}", task.priority),
            Style::default().fg(Color::Magenta),
        ));
    }

    if task.migrated_count > 0 {
        // Carried forward this many days without being finished
        spans.push(Span::styled(
            format!("  >{}", task.migrated_count),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if let Some(due) = task.due_day() {
        let style = if task.is_overdue(today) {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("  due {}", due.format("%Y-%m-%d")), style));
    }

    Line::from(spans)
}

fn render_status_bar(f: &mut Frame, app: &App, layout: &Layout) {
    let text = match (&app.status_message, app.mode) {
        (Some(message), _) => message.clone(),
        (None, Mode::ConfirmArchive) => "Archive selected task? y/n".to_string(),
        (None, Mode::AddTask) => "Type the task title".to_string(),
        (None, Mode::Browse) => {
            let kb = &app.config.key_bindings;
            format!(
                "{}: quit  {}: new  {}: done  {}: archive  {}: cancel  {}: prepare day  {}: sync",
                kb.quit, kb.new_task, kb.toggle_done, kb.archive, kb.cancel_task, kb.prepare_day, kb.refresh
            )
        }
    };
    let status = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    f.render_widget(status, layout.status_area);
}
