use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, ChatRole, InputMode, MemoriesFocus, Picker, Screen};
use crate::model::{ChatModel, CollectionKey};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Memories => render_memories_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.picker.is_some() {
        render_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let id = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    let backend = match app.backend_status.as_deref() {
        Some("healthy") => Span::styled(" backend:healthy ", Style::default().fg(Color::Green)),
        Some(other) => Span::styled(
            format!(" backend:{} ", other),
            Style::default().fg(Color::Red),
        ),
        None => Span::styled(" backend:? ", Style::default().fg(Color::DarkGray)),
    };

    let title = Line::from(vec![
        Span::styled(" Companion Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(
                " {} ⇄ {} · {} ",
                id(&app.user_id),
                id(&app.dog_id),
                id(&app.conversation_id)
            ),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!(" [{}] ", app.model.as_str()),
            Style::default().fg(Color::Magenta),
        ),
        backend,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Editing) => " CHAT ",
        (Screen::Chat, InputMode::Normal) => " CHAT·NAV ",
        (Screen::Memories, _) => " MEMORIES ",
    };

    let hint = if let Some(status) = &app.status_line {
        status.clone()
    } else if let Some(blocker) = app.submit_blocker() {
        format!("submit disabled: {}", blocker)
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Editing) => {
                "Enter send · Esc nav mode".to_string()
            }
            (Screen::Chat, InputMode::Normal) => {
                "i edit · U/D/C pick ids · M model · R refresh · m memories · q quit".to_string()
            }
            (Screen::Memories, InputMode::Editing) => "Enter search · Esc done".to_string(),
            (Screen::Memories, InputMode::Normal) => {
                "/ edit query · c collection · h/l panes · Esc chat · q quit".to_string()
            }
        }
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::raw(" "),
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

// ---- chat screen ----

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    render_transcript(app, frame, transcript_area);
    render_chat_input(app, frame, input_area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Conversation ");
    let inner = block.inner(area);

    // Remember the drawing area so scroll math matches the render
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages {
        let (label, style) = match msg.role {
            ChatRole::User => ("You:", Style::default().fg(Color::Cyan).bold()),
            ChatRole::Assistant => ("Dog:", Style::default().fg(Color::Green).bold()),
            ChatRole::Error => ("Error:", Style::default().fg(Color::Red).bold()),
        };
        lines.push(Line::from(Span::styled(label, style)));
        for content_line in msg.content.lines() {
            lines.push(Line::from(content_line.to_string()));
        }
        lines.push(Line::default());
    }

    // Thinking indicator while nothing has been revealed yet
    if app.loading && app.playback.revealed().is_empty() {
        let dots = ".".repeat((app.animation_frame + 1) as usize);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).italic(),
        )));
    }

    let transcript = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(transcript, area);
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_style = if app.input_mode == InputMode::Editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let title = if app.loading {
        " Message (sending...) "
    } else {
        " Message "
    };

    let input = Paragraph::new(app.query_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title),
    );
    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = area.x + 1 + app.query_cursor.min(area.width.saturating_sub(2) as usize) as u16;
        frame.set_cursor_position(Position::new(cursor_x, area.y + 1));
    }
}

// ---- memories screen ----

fn render_memories_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, body_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let border_style = if app.input_mode == InputMode::Editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let search_input = Paragraph::new(app.mem_query_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(format!(" Search {} ", app.mem_collection.as_str())),
    );
    frame.render_widget(search_input, input_area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = input_area.x + 1 + app.mem_query_input.chars().count() as u16;
        frame.set_cursor_position(Position::new(
            cursor_x.min(input_area.x + input_area.width.saturating_sub(2)),
            input_area.y + 1,
        ));
    }

    let [results_area, preview_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(body_area);

    render_memory_results(app, frame, results_area);
    render_memory_preview(app, frame, preview_area);
}

fn render_memory_results(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.mem_focus == MemoriesFocus::Results;
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let items: Vec<ListItem> = app
        .mem_results
        .iter()
        .map(|hit| {
            let type_style = match hit.memory_type.as_str() {
                "profile_v1" => Style::default().fg(Color::Magenta),
                "event_v1" => Style::default().fg(Color::Blue),
                _ => Style::default().fg(Color::DarkGray),
            };
            let score = hit
                .score
                .map(|s| format!(" {:.2}", s))
                .unwrap_or_default();
            let preview: String = hit.content.chars().take(40).collect();
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<10}", hit.memory_type), type_style),
                Span::raw(preview),
                Span::styled(score, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let title = format!(" Results ({}) ", app.mem_results.len());
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.mem_state);
}

fn render_memory_preview(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.mem_focus == MemoriesFocus::Preview;
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let content = match app.selected_memory() {
        Some(hit) => hit.content.clone(),
        None => "No memory selected".to_string(),
    };

    let preview = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(" Memory "),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(preview, area);
}

// ---- picker overlay ----

fn render_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(picker) = app.picker else {
        return;
    };

    let title = match picker {
        Picker::User => " Select user ",
        Picker::Dog => " Select dog ",
        Picker::Conversation => " Select conversation ",
        Picker::Model => " Select model ",
        Picker::Collection => " Select collection ",
    };

    let popup = centered_rect(50, 50, area);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = match picker {
        Picker::Conversation => app
            .picker_items
            .iter()
            .map(|id| {
                let label = app
                    .cache
                    .conversations
                    .iter()
                    .find(|c| c.id == *id)
                    .map(|c| format!("{}  {}", c.id, c.title))
                    .unwrap_or_else(|| id.clone());
                ListItem::new(label)
            })
            .collect(),
        Picker::Model => app
            .picker_items
            .iter()
            .map(|item| {
                let label = ChatModel::from_str(item)
                    .map(|m| m.display_name().to_string())
                    .unwrap_or_else(|| item.clone());
                ListItem::new(label)
            })
            .collect(),
        Picker::Collection => app
            .picker_items
            .iter()
            .map(|item| {
                let label = CollectionKey::all()
                    .into_iter()
                    .find(|k| k.as_str() == item)
                    .map(|k| format!("{:<13} {}", item, k.display_name()))
                    .unwrap_or_else(|| item.clone());
                ListItem::new(label)
            })
            .collect(),
        _ => app
            .picker_items
            .iter()
            .map(|item| ListItem::new(item.clone()))
            .collect(),
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, popup, &mut app.picker_state);
}

/// Center a w% x h% popup within `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [_, vertical, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);
    let [_, horizontal, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(vertical);
    horizontal
}
