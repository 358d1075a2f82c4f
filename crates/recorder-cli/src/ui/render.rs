use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Tabs},
};

use super::app::App;
use super::view_model::{UiModal, UiView};
use super::widgets::{centered_rect, draw_list_panel, draw_modal_text, modal_block, tone_style};
use crate::format::truncate_label;

pub(crate) fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let view = UiView::from_app(app);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(5),
        ])
        .split(f.area());

    let header = Paragraph::new(view.header_lines.iter().cloned().map(Line::from).collect::<Vec<_>>())
        .block(Block::default().borders(Borders::ALL).title("Server"));
    f.render_widget(header, chunks[0]);

    let tabs = Tabs::new(view.tab_titles.iter().cloned().map(Line::from).collect::<Vec<_>>())
        .block(Block::default().borders(Borders::ALL).title("Views"))
        .select(view.tab_index)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));
    f.render_widget(tabs, chunks[1]);

    let list_area = chunks[2];
    let list_block = modal_block(&view.list.title);
    let inner = list_block.inner(list_area);
    app.list_view_height = inner.height as usize;
    let width = inner.width.saturating_sub(2) as usize;
    if view.list.rows.is_empty() {
        let empty = Paragraph::new(view.list.empty_text.as_str()).block(list_block);
        f.render_widget(empty, list_area);
    } else {
        let items: Vec<ListItem> = view
            .list
            .rows
            .iter()
            .map(|row| ListItem::new(truncate_label(&row.label, width)).style(tone_style(row.tone)))
            .collect();
        let list = draw_list_panel(&view.list.title, items, true);
        let tab = app.tab;
        f.render_stateful_widget(list, list_area, app.list_state_mut(tab));
    }

    let footer_block = Block::default().borders(Borders::ALL).title("Status");
    let footer_inner = footer_block.inner(chunks[3]);
    f.render_widget(footer_block, chunks[3]);

    let footer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
        .split(footer_inner);

    f.render_widget(Paragraph::new(Line::from(view.status_line.clone())), footer_chunks[0]);
    if let Some((ratio, label)) = view.gauge.as_ref() {
        let gauge_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(10), Constraint::Length(48)])
            .split(footer_chunks[1]);

        let gauge = Gauge::default()
            .ratio(*ratio)
            .style(Style::default().fg(Color::Black).bg(Color::White))
            .gauge_style(Style::default().fg(Color::White).bg(Color::Black));
        f.render_widget(gauge, gauge_chunks[0]);
        f.render_widget(
            Paragraph::new(Line::from(truncate_label(label, 48))).alignment(Alignment::Right),
            gauge_chunks[1],
        );
    } else {
        f.render_widget(Paragraph::new(Line::from("download: -")), footer_chunks[1]);
    }
    f.render_widget(Paragraph::new(Line::from(view.keys_line.clone())), footer_chunks[2]);

    if let Some(modal) = view.active_modal.as_ref() {
        draw_modal(f, app, modal);
    }
}

fn draw_modal(f: &mut ratatui::Frame, app: &App, modal: &UiModal) {
    match modal {
        UiModal::Help { title, body, layout } | UiModal::Confirm { title, body, layout } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            f.render_widget(draw_modal_text(title, body), area);
        }
        UiModal::Login {
            title,
            lines,
            error,
            layout,
        } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            let mut text: Vec<Line> = lines.iter().cloned().map(Line::from).collect();
            if let Some(err) = error {
                text.push(Line::from(""));
                text.push(Line::from(err.clone()).style(Style::default().fg(Color::Red)));
            }
            f.render_widget(Paragraph::new(text).block(modal_block(title)), area);
        }
        UiModal::Prompt {
            title,
            label,
            input,
            layout,
        } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            let text = vec![Line::from(label.clone()), Line::from(format!("> {input}_"))];
            f.render_widget(Paragraph::new(text).block(modal_block(title)), area);
        }
        UiModal::Logs { title, empty, layout } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            let block = modal_block(title);
            let height = block.inner(area).height as usize;
            let total = app.logs.len();
            let end = total.saturating_sub(app.logs_scroll);
            let start = end.saturating_sub(height);
            let mut items: Vec<ListItem> = app
                .logs
                .iter()
                .skip(start)
                .take(end.saturating_sub(start))
                .map(|line| ListItem::new(line.clone()))
                .collect();
            if *empty {
                items.push(ListItem::new("<no logs>"));
            }
            f.render_widget(List::new(items).block(block), area);
        }
    }
}
