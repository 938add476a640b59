use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode, MemoriesFocus, Picker, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.on_tick();
        }
        AppEvent::Stream(stream_event) => {
            app.apply_stream_event(stream_event);
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Any keypress clears a stale footer hint
    app.status_line = None;

    if app.picker.is_some() {
        handle_picker(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await?,
        InputMode::Editing => handle_editing_mode(app, key).await?,
    }

    Ok(())
}

fn handle_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.close_picker();
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.picker_nav_up();
        }
        KeyCode::Enter => {
            app.confirm_picker();
        }
        _ => {}
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    // Screen-independent keys
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return Ok(());
        }
        KeyCode::Char('U') => {
            app.open_picker(Picker::User);
            return Ok(());
        }
        KeyCode::Char('D') => {
            app.open_picker(Picker::Dog);
            return Ok(());
        }
        KeyCode::Char('C') => {
            app.open_picker(Picker::Conversation);
            return Ok(());
        }
        KeyCode::Char('M') => {
            app.open_picker(Picker::Model);
            return Ok(());
        }
        KeyCode::Char('R') => {
            app.refresh_entity_lists().await;
            return Ok(());
        }
        _ => {}
    }

    match app.screen {
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Memories => handle_memories_normal(app, key),
    }
    Ok(())
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Enter editing
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.query_cursor = app.query_input.chars().count();
        }

        // Switch to memories screen
        KeyCode::Char('m') | KeyCode::Tab => {
            app.screen = Screen::Memories;
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => {
            app.chat_scroll = app.chat_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.chat_scroll = app.chat_scroll.saturating_sub(1);
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_add(app.chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_scroll = app.chat_scroll.saturating_sub(app.chat_height / 2);
        }
        KeyCode::Char('g') => {
            app.chat_scroll = 0;
        }
        KeyCode::Char('G') => {
            app.scroll_chat_to_bottom();
        }

        _ => {}
    }
}

fn handle_memories_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Back to chat
        KeyCode::Esc | KeyCode::Tab => {
            app.screen = Screen::Chat;
            app.mem_focus = MemoriesFocus::Results;
        }

        // Edit the search query
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
        }

        // Pick the collection to search
        KeyCode::Char('c') => {
            app.open_picker(Picker::Collection);
        }

        // Results <-> preview focus
        KeyCode::Char('l') | KeyCode::Right => {
            app.mem_focus = MemoriesFocus::Preview;
        }
        KeyCode::Char('h') | KeyCode::Left => {
            app.mem_focus = MemoriesFocus::Results;
        }

        KeyCode::Char('j') | KeyCode::Down => {
            app.mem_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.mem_nav_up();
        }

        _ => {}
    }
}

async fn handle_editing_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    match app.screen {
        Screen::Chat => handle_chat_editing(app, key),
        Screen::Memories => handle_memories_editing(app, key).await,
    }
    Ok(())
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Admission control lives in submit_query: nothing happens until
            // the triple is bound and no request is in flight.
            app.submit_query();
        }
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.query_input.chars().count();
            if app.query_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.query_input.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = app.query_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
            app.query_input.insert(byte_pos, c);
            app.query_cursor += 1;
        }
        _ => {}
    }
}

async fn handle_memories_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.perform_memory_search().await;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.mem_query_input.pop();
        }
        KeyCode::Char(c) => {
            app.mem_query_input.push(c);
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => match app.screen {
            Screen::Chat => {
                app.chat_scroll = app.chat_scroll.saturating_add(3);
            }
            Screen::Memories => {
                app.mem_nav_down();
            }
        },
        MouseEventKind::ScrollUp => match app.screen {
            Screen::Chat => {
                app.chat_scroll = app.chat_scroll.saturating_sub(3);
            }
            Screen::Memories => {
                app.mem_nav_up();
            }
        },
        _ => {}
    }
}
