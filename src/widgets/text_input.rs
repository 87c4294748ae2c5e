use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use tui_textarea::{CursorMove, Input, Key, TextArea};

/// Event emitted by [`TextInput::handle_key`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInputEvent {
    None,
    Submit,
    Cancel,
    HistoryChanged,
}

/// Single-line prompt over tui-textarea, with session history.
pub struct TextInput {
    textarea: TextArea<'static>,
    history: Vec<String>,
    history_index: Option<usize>,
    history_temp: Option<String>,
    history_limit: usize,
    text_color: Option<Color>,
    focused: bool,
}

impl TextInput {
    pub fn new() -> Self {
        let mut widget = Self {
            textarea: TextArea::default(),
            history: Vec::new(),
            history_index: None,
            history_temp: None,
            history_limit: 100,
            text_color: None,
            focused: false,
        };
        widget.apply_style();
        widget
    }

    pub fn with_text_color(mut self, color: Color) -> Self {
        self.text_color = Some(color);
        self.apply_style();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    fn apply_style(&mut self) {
        let mut style = Style::default();
        if let Some(color) = self.text_color {
            style = style.fg(color);
        }
        self.textarea.set_style(style);
        self.textarea.set_cursor_line_style(Style::default());
        self.apply_cursor();
    }

    fn apply_cursor(&mut self) {
        if self.focused {
            self.textarea
                .set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        } else {
            // Same style as the text hides the cursor.
            let style = self.textarea.style();
            self.textarea.set_cursor_style(style);
        }
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        self.apply_cursor();
    }

    pub fn value(&self) -> &str {
        self.textarea
            .lines()
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn set_value(&mut self, value: &str) {
        self.textarea = TextArea::new(vec![value.replace(['\n', '\r'], " ")]);
        self.apply_style();
        self.textarea.move_cursor(CursorMove::End);
    }

    pub fn clear(&mut self) {
        self.set_value("");
        self.history_index = None;
        self.history_temp = None;
    }

    pub fn is_empty(&self) -> bool {
        self.value().is_empty()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Appends the current value, moving a repeated entry to the end.
    fn push_history(&mut self) {
        let value = self.value().trim().to_string();
        if value.is_empty() {
            return;
        }
        self.history.retain(|entry| entry != &value);
        self.history.push(value);
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }

    fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.history_index {
            Some(i) => i.saturating_sub(1),
            None => {
                self.history_temp = Some(self.value().to_string());
                self.history.len() - 1
            }
        };
        self.history_index = Some(index);
        let entry = self.history[index].clone();
        self.set_value(&entry);
    }

    fn history_down(&mut self) {
        let Some(index) = self.history_index else {
            return;
        };
        if index + 1 >= self.history.len() {
            let temp = self.history_temp.take().unwrap_or_default();
            self.set_value(&temp);
            self.history_index = None;
        } else {
            self.history_index = Some(index + 1);
            let entry = self.history[index + 1].clone();
            self.set_value(&entry);
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> TextInputEvent {
        match event.code {
            KeyCode::Enter => {
                self.push_history();
                self.history_index = None;
                self.history_temp = None;
                TextInputEvent::Submit
            }
            KeyCode::Esc => TextInputEvent::Cancel,
            KeyCode::Up => {
                self.history_up();
                TextInputEvent::HistoryChanged
            }
            KeyCode::Down => {
                self.history_down();
                TextInputEvent::HistoryChanged
            }
            _ => {
                let input = key_event_to_input(event);
                if matches!(input.key, Key::Null) {
                    return TextInputEvent::None;
                }
                self.textarea.input(input);
                self.history_index = None;
                self.history_temp = None;
                TextInputEvent::None
            }
        }
    }
}

fn key_event_to_input(event: &KeyEvent) -> Input {
    let key = match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Delete => Key::Delete,
        _ => Key::Null,
    };
    Input {
        key,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
    }
}

impl Default for TextInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for &TextInput {
    fn render(self, area: Rect, buf: &mut ratatui::buffer::Buffer) {
        self.textarea.render(area, buf);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let cell = &mut buf[(x, y)];
                let style = cell.style().remove_modifier(Modifier::UNDERLINED);
                cell.set_style(style);
            }
        }
    }
}
