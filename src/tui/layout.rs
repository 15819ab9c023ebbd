use ratatui::layout::{Constraint, Direction, Layout as RatLayout, Rect};

pub struct Layout {
    pub tabs_area: Rect,
    pub list_area: Rect,
    pub input_area: Rect,
    pub status_area: Rect,
}

impl Layout {
    /// Minimum terminal dimensions required for the application.
    /// Height: 2 outer borders + 1 tabs + 3 list + 3 input + 1 status.
    pub const MIN_WIDTH: u16 = 40;
    pub const MIN_HEIGHT: u16 = 10;

    pub fn calculate(size: Rect, show_input: bool) -> Self {
        // Inner area, accounting for the outer border (1 char on each side)
        let inner_area = Rect::new(
            size.x + 1,
            size.y + 1,
            size.width.saturating_sub(2),
            size.height.saturating_sub(2),
        );

        let input_height = if show_input { 3 } else { 0 };

        let vertical = RatLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),            // Context tabs
                Constraint::Min(1),               // Task list
                Constraint::Length(input_height), // Quick-add input (when open)
                Constraint::Length(1),            // Status line
            ])
            .split(inner_area);

        Self {
            tabs_area: vertical[0],
            list_area: vertical[1],
            input_area: vertical[2],
            status_area: vertical[3],
        }
    }
}
