use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, StatefulWidget, Widget},
};

/// One line in a picker: label plus an optional check mark.
#[derive(Debug, Clone, PartialEq)]
pub struct PickerItem {
    pub label: String,
    pub checked: Option<bool>,
}

impl PickerItem {
    pub fn plain(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            checked: None,
        }
    }

    pub fn checkbox(label: impl Into<String>, checked: bool) -> Self {
        Self {
            label: label.into(),
            checked: Some(checked),
        }
    }
}

/// Centered modal list used for the column and region pickers.
pub struct Picker<'a> {
    title: &'a str,
    items: &'a [PickerItem],
    border_color: Color,
}

impl<'a> Picker<'a> {
    pub fn new(title: &'a str, items: &'a [PickerItem]) -> Self {
        Self {
            title,
            items,
            border_color: Color::Cyan,
        }
    }

    pub fn with_border_color(mut self, color: Color) -> Self {
        self.border_color = color;
        self
    }
}

/// Rect of `width` x `height` centered in `area`, clipped to it.
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    rect
}

impl StatefulWidget for Picker<'_> {
    type State = ListState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let width = self
            .items
            .iter()
            .map(|i| i.label.chars().count() + 6)
            .max()
            .unwrap_or(0)
            .max(self.title.chars().count() + 4) as u16;
        let rect = centered(area, width + 2, self.items.len() as u16 + 2);
        Clear.render(rect, buf);

        let items: Vec<ListItem> = self
            .items
            .iter()
            .map(|item| {
                let text = match item.checked {
                    Some(true) => format!("[x] {}", item.label),
                    Some(false) => format!("[ ] {}", item.label),
                    None => item.label.clone(),
                };
                ListItem::new(text)
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.border_color))
                    .title(self.title),
            )
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        StatefulWidget::render(list, rect, buf, state);
    }
}
