use anyhow::Result;
use charter_recon::db::RunDetail;
use charter_recon::record::{format_cents, Record};
use charter_recon::MatchPair;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Matched,
    UnmatchedA,
    UnmatchedB,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Matched => Page::UnmatchedA,
            Page::UnmatchedA => Page::UnmatchedB,
            Page::UnmatchedB => Page::Matched,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Matched => Page::UnmatchedB,
            Page::UnmatchedA => Page::Matched,
            Page::UnmatchedB => Page::UnmatchedA,
        }
    }
}

/// Sort order for the unmatched pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Input order
    Line,
    /// Largest absolute amount first
    Amount,
}

pub struct App {
    pub run: RunDetail,
    pub current_page: Page,
    pub matched_state: TableState,
    pub unmatched_a_state: TableState,
    pub unmatched_b_state: TableState,
    pub show_detail: bool,
    pub sort: SortOrder,
}

fn initial_state(len: usize) -> TableState {
    let mut state = TableState::default();
    if len > 0 {
        state.select(Some(0));
    }
    state
}

impl App {
    pub fn new(run: RunDetail) -> Self {
        let matched_state = initial_state(run.outcome.pairs.len());
        let unmatched_a_state = initial_state(run.outcome.unmatched_a.len());
        let unmatched_b_state = initial_state(run.outcome.unmatched_b.len());

        Self {
            run,
            current_page: Page::Matched,
            matched_state,
            unmatched_a_state,
            unmatched_b_state,
            show_detail: false,
            sort: SortOrder::Line,
        }
    }

    pub fn page_title(&self, page: Page) -> String {
        let s = &self.run.summary;
        match page {
            Page::Matched => format!("Matched ({})", s.matched),
            Page::UnmatchedA => format!("Only in {} ({})", s.label_a, s.unmatched_a),
            Page::UnmatchedB => format!("Only in {} ({})", s.label_b, s.unmatched_b),
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Switch unmatched pages between input order and largest amount first
    pub fn toggle_sort(&mut self) {
        self.sort = match self.sort {
            SortOrder::Line => SortOrder::Amount,
            SortOrder::Amount => SortOrder::Line,
        };
        let sort = self.sort;
        for list in [&mut self.run.outcome.unmatched_a, &mut self.run.outcome.unmatched_b] {
            match sort {
                SortOrder::Amount => {
                    list.sort_by_key(|u| (std::cmp::Reverse(u.record.amount_cents.unsigned_abs()), u.index))
                }
                SortOrder::Line => list.sort_by_key(|u| u.index),
            }
        }
        self.unmatched_a_state = initial_state(self.run.outcome.unmatched_a.len());
        self.unmatched_b_state = initial_state(self.run.outcome.unmatched_b.len());
    }

    fn current_len(&self) -> usize {
        match self.current_page {
            Page::Matched => self.run.outcome.pairs.len(),
            Page::UnmatchedA => self.run.outcome.unmatched_a.len(),
            Page::UnmatchedB => self.run.outcome.unmatched_b.len(),
        }
    }

    fn current_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Matched => &mut self.matched_state,
            Page::UnmatchedA => &mut self.unmatched_a_state,
            Page::UnmatchedB => &mut self.unmatched_b_state,
        }
    }

    pub fn selected_pair(&self) -> Option<&MatchPair> {
        self.matched_state
            .selected()
            .and_then(|i| self.run.outcome.pairs.get(i))
    }

    pub fn selected_unmatched(&self) -> Option<&Record> {
        let (state, list) = match self.current_page {
            Page::UnmatchedA => (&self.unmatched_a_state, &self.run.outcome.unmatched_a),
            Page::UnmatchedB => (&self.unmatched_b_state, &self.run.outcome.unmatched_b),
            Page::Matched => return None,
        };
        state.selected().and_then(|i| list.get(i)).map(|u| &u.record)
    }

    fn move_by(&mut self, delta: isize, wrap: bool) {
        let len = self.current_len();
        if len == 0 {
            return;
        }
        let state = self.current_state();
        let current = state.selected().unwrap_or(0) as isize;
        let last = len as isize - 1;
        let next = current + delta;
        let i = if wrap {
            if next > last {
                0
            } else if next < 0 {
                last
            } else {
                next
            }
        } else {
            next.clamp(0, last)
        };
        state.select(Some(i as usize));
    }

    pub fn next(&mut self) {
        self.move_by(1, true);
    }

    pub fn previous(&mut self) {
        self.move_by(-1, true);
    }

    pub fn page_down(&mut self) {
        self.move_by(20, false);
    }

    pub fn page_up(&mut self) {
        self.move_by(-20, false);
    }

    pub fn home(&mut self) {
        if self.current_len() > 0 {
            self.current_state().select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let len = self.current_len();
        if len > 0 {
            self.current_state().select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('s') => app.toggle_sort(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_page(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_page(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_page(f: &mut Frame, area: Rect, app: &mut App) {
    match app.current_page {
        Page::Matched => render_matched(f, area, app),
        Page::UnmatchedA | Page::UnmatchedB => render_unmatched(f, area, app),
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Matched, Page::UnmatchedA, Page::UnmatchedB].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(app.page_title(*page), style));
    }

    let s = &app.run.summary;
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Rate: {:.1}%", s.match_rate * 100.0),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Run {}", truncate(&s.run_id, 8)),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&str]) -> Row<'static> {
    let cells: Vec<Cell> = titles
        .iter()
        .map(|h| {
            Cell::from(h.to_string()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        })
        .collect();
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn amount_color(cents: i64) -> Color {
    if cents < 0 {
        Color::Red
    } else {
        Color::Green
    }
}

fn score_color(score: f64) -> Color {
    if score >= 0.85 {
        Color::Green
    } else if score >= 0.65 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_matched(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .run
        .outcome
        .pairs
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.a.date.to_string()),
                Cell::from(format_cents(p.a.amount_cents)).style(Style::default().fg(amount_color(p.a.amount_cents))),
                Cell::from(truncate(p.a.display_name(), 28)),
                Cell::from(truncate(p.b.display_name(), 28)),
                Cell::from(format!("{:+}d", p.date_diff_days)),
                Cell::from(format!("{:.2}", p.score.total)).style(Style::default().fg(score_color(p.score.total))),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(30),
            Constraint::Length(30),
            Constraint::Length(5),
            Constraint::Length(6),
        ],
    )
    .header(header_row(&["Date", "Amount", "A", "B", "Δ", "Score"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} ", app.page_title(Page::Matched))),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.matched_state);
}

fn render_unmatched(f: &mut Frame, area: Rect, app: &mut App) {
    let page = app.current_page;
    let title = format!(" {} ", app.page_title(page));
    let (list, state) = match page {
        Page::UnmatchedB => (&app.run.outcome.unmatched_b, &mut app.unmatched_b_state),
        _ => (&app.run.outcome.unmatched_a, &mut app.unmatched_a_state),
    };

    let rows: Vec<Row> = list
        .iter()
        .map(|u| {
            let r = &u.record;
            Row::new(vec![
                Cell::from(r.date.to_string()),
                Cell::from(format_cents(r.amount_cents)).style(Style::default().fg(amount_color(r.amount_cents))),
                Cell::from(truncate(&r.description, 40)),
                Cell::from(r.reference.clone().unwrap_or_default()),
                Cell::from(format!("{}:{}", truncate(&r.source_file, 16), r.line_number)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(42),
            Constraint::Length(12),
            Constraint::Length(22),
        ],
    )
    .header(header_row(&["Date", "Amount", "Description", "Ref", "Line"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = match app.current_page {
        Page::Matched => app.matched_state.selected(),
        Page::UnmatchedA => app.unmatched_a_state.selected(),
        Page::UnmatchedB => app.unmatched_b_state.selected(),
    }
    .map(|i| i + 1)
    .unwrap_or(0);

    let sort = match app.sort {
        SortOrder::Line => "line",
        SortOrder::Amount => "amount",
    };

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.current_len()),
        Style::default().fg(Color::Cyan),
    )];
    for (key, label) in [
        ("Enter", " Details | "),
        ("Tab", " Page | "),
        ("s", ""),
        ("↑/↓", " Nav | "),
        ("PgUp/PgDn", " Fast | "),
    ] {
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        if key == "s" {
            spans.push(Span::raw(format!(" Sort ({}) | ", sort)));
        } else {
            spans.push(Span::raw(label));
        }
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn label(text: &str) -> Span<'static> {
    Span::styled(
        format!("  {}: ", text),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn section(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {}", text),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    ))
}

fn record_lines(r: &Record) -> Vec<Line<'static>> {
    vec![
        Line::from(vec![label("Date"), Span::raw(r.date.to_string())]),
        Line::from(vec![
            label("Amount"),
            Span::styled(format_cents(r.amount_cents), Style::default().fg(amount_color(r.amount_cents))),
        ]),
        Line::from(vec![label("Description"), Span::raw(wrap_text(&r.description, 35))]),
        Line::from(vec![label("Reference"), Span::raw(r.reference.clone().unwrap_or_default())]),
        Line::from(vec![label("Vendor"), Span::raw(r.vendor.clone().unwrap_or_default())]),
        Line::from(vec![
            label("Source"),
            Span::styled(
                format!("{} {}:{}", r.source, r.source_file, r.line_number),
                Style::default().fg(Color::Green),
            ),
        ]),
    ]
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let mut content = vec![Line::from("")];

    match app.current_page {
        Page::Matched => match app.selected_pair() {
            Some(p) => {
                content.push(section(&app.run.summary.label_a.to_uppercase()));
                content.extend(record_lines(&p.a));
                content.push(Line::from(""));
                content.push(section(&app.run.summary.label_b.to_uppercase()));
                content.extend(record_lines(&p.b));
                content.push(Line::from(""));
                content.push(section("SCORE"));
                content.push(Line::from(vec![
                    label("Total"),
                    Span::styled(format!("{:.3}", p.score.total), Style::default().fg(score_color(p.score.total))),
                ]));
                content.push(Line::from(format!(
                    "    date {:.2}  amount {:.2}  text {:.2}",
                    p.score.date_score, p.score.amount_score, p.score.text_score
                )));
                content.push(Line::from(format!(
                    "    {} day(s) apart, {} apart",
                    p.date_diff_days,
                    format_cents(p.amount_diff_cents)
                )));
            }
            None => content.push(Line::from("  Nothing selected")),
        },
        Page::UnmatchedA | Page::UnmatchedB => match app.selected_unmatched() {
            Some(r) => content.extend(record_lines(r)),
            None => content.push(Line::from("  Nothing selected")),
        },
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Details "),
    );

    f.render_widget(detail_panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", keep)
    }
}

fn wrap_text(text: &str, width: usize) -> String {
    if text.len() <= width {
        return text.to_string();
    }

    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() < width {
            if !current_line.is_empty() {
                current_line.push(' ');
            }
            current_line.push_str(word);
        } else {
            if !result.is_empty() {
                result.push_str("\n  ");
            }
            result.push_str(&current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        if !result.is_empty() {
            result.push_str("\n  ");
        }
        result.push_str(&current_line);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use charter_recon::{MatchConfig, Matcher, RunSummary};

    fn test_app() -> App {
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let a = vec![
            Record::new("bank", day(1), -10500, "FAS GAS"),
            Record::new("bank", day(2), -1500, "SERVICE CHARGE"),
            Record::new("bank", day(3), -90000, "HEFFNER AUTO"),
        ];
        let b = vec![Record::new("ledger", day(1), -10500, "Fas Gas")];
        let config = MatchConfig::default();
        let outcome = Matcher::new(config.clone()).unwrap().match_records(&a, &b);
        let summary = RunSummary::from_outcome("bank", "ledger", &outcome);
        App::new(RunDetail { summary, config, outcome })
    }

    #[test]
    fn test_page_cycle() {
        let mut app = test_app();
        assert_eq!(app.current_page, Page::Matched);
        app.next_page();
        app.next_page();
        assert_eq!(app.current_page, Page::UnmatchedB);
        app.next_page();
        assert_eq!(app.current_page, Page::Matched);
        app.previous_page();
        assert_eq!(app.current_page, Page::UnmatchedB);
    }

    #[test]
    fn test_navigation_wraps_per_page() {
        let mut app = test_app();
        app.next_page();
        assert_eq!(app.unmatched_a_state.selected(), Some(0));
        app.next();
        assert_eq!(app.unmatched_a_state.selected(), Some(1));
        app.next();
        assert_eq!(app.unmatched_a_state.selected(), Some(0));
        app.end();
        assert_eq!(app.unmatched_a_state.selected(), Some(1));
        assert_eq!(app.matched_state.selected(), Some(0));
    }

    #[test]
    fn test_empty_page_has_no_selection() {
        let mut app = test_app();
        app.previous_page();
        assert_eq!(app.current_page, Page::UnmatchedB);
        app.next();
        app.page_down();
        assert_eq!(app.unmatched_b_state.selected(), None);
        assert!(app.selected_unmatched().is_none());
    }

    #[test]
    fn test_sort_by_amount() {
        let mut app = test_app();
        app.next_page();
        assert_eq!(app.selected_unmatched().unwrap().description, "SERVICE CHARGE");

        app.toggle_sort();
        assert_eq!(app.selected_unmatched().unwrap().description, "HEFFNER AUTO");

        app.toggle_sort();
        assert_eq!(app.selected_unmatched().unwrap().description, "SERVICE CHARGE");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate("Café Résidence Limo", 8), "Café ...");
        assert_eq!(truncate("short", 8), "short");
    }
}
