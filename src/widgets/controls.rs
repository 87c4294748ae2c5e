use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    widgets::{Paragraph, Widget},
};

/// Bottom bar: key hints and the matched/total row count.
#[derive(Default)]
pub struct Controls {
    pub matched: Option<usize>,
    pub total: usize,
    pub selected: usize,
    pub dimmed: bool,
    pub query_active: bool,
    pub background: Option<Color>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(mut self, matched: usize, total: usize, selected: usize) -> Self {
        self.matched = Some(matched);
        self.total = total;
        self.selected = selected;
        self
    }

    pub fn with_dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    pub fn with_query_active(mut self, query_active: bool) -> Self {
        self.query_active = query_active;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    fn counts_text(&self) -> Option<String> {
        let matched = self.matched?;
        let mut text = if matched == self.total {
            format!("Rows: {}", matched)
        } else {
            format!("Rows: {}/{}", matched, self.total)
        };
        if self.selected > 0 {
            text.push_str(&format!("  Sel: {}", self.selected));
        }
        Some(text)
    }
}

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const CONTROLS: [(&str, &str); 9] = [
            ("/", "Search"),
            (":", "Query"),
            ("s", "Sort"),
            ("c", "Columns"),
            ("Tab", "Region"),
            ("v", "View"),
            ("R", "Reset"),
            ("?", "Help"),
            ("q", "Quit"),
        ];

        let counts = self.counts_text();
        let mut constraints = CONTROLS.iter().fold(vec![], |mut acc, (key, action)| {
            acc.push(Constraint::Length(key.chars().count() as u16 + 2));
            acc.push(Constraint::Length(action.chars().count() as u16 + 1));
            acc
        });
        constraints.push(Constraint::Fill(1));
        if let Some(text) = &counts {
            constraints.push(Constraint::Length(text.chars().count() as u16 + 1));
        }

        let layout = Layout::new(Direction::Horizontal, constraints).split(area);
        let bar = self.background.unwrap_or(Color::DarkGray);
        let base_style = if self.dimmed {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        for (i, (key, action)) in CONTROLS.iter().enumerate() {
            let j = i * 2;
            Paragraph::new(*key)
                .style(base_style.bold())
                .centered()
                .render(layout[j], buf);
            let action_style = if *action == "Query" && self.query_active {
                base_style.bg(bar).fg(Color::Cyan)
            } else {
                base_style.bg(bar)
            };
            Paragraph::new(*action)
                .style(action_style)
                .render(layout[j + 1], buf);
        }

        let fill = CONTROLS.len() * 2;
        Paragraph::new("")
            .style(base_style.bg(bar))
            .render(layout[fill], buf);
        if let Some(text) = counts {
            Paragraph::new(text)
                .style(base_style.bg(bar).fg(if self.dimmed {
                    Color::DarkGray
                } else {
                    Color::White
                }))
                .right_aligned()
                .render(layout[fill + 1], buf);
        }
    }
}
