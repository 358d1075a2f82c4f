use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};

use super::view_model::Tone;

pub(crate) fn modal_block(title: &str) -> Block<'_> {
    Block::default().title(title).borders(Borders::ALL)
}

pub(crate) fn draw_modal_text<'a>(title: &'a str, body: &'a str) -> Paragraph<'a> {
    Paragraph::new(body)
        .block(modal_block(title))
        .wrap(Wrap { trim: false })
}

pub(crate) fn draw_list_panel<'a>(title: &'a str, items: Vec<ListItem<'a>>, highlight: bool) -> List<'a> {
    let mut list = List::new(items).block(modal_block(title));
    if highlight {
        list = list
            .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
            .highlight_symbol("▶ ");
    }
    list
}

pub(crate) fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Normal => Style::default(),
        Tone::Live => Style::default().fg(Color::Green),
        Tone::Warn => Style::default().fg(Color::Yellow),
        Tone::Dim => Style::default().fg(Color::DarkGray),
        Tone::Marked => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    }
}

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    horizontal[1]
}
