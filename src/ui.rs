// 🖥️ Vehicle Browser - Terminal UI over the vehicle store

use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use manual_hunter::store::{self, SourceStat, VehicleStats};
use manual_hunter::{SortOrder, VehicleRecord, VehicleView};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;

const PAGE_JUMP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Vehicles,
    Sources,
    Views,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Vehicles => Page::Sources,
            Page::Sources => Page::Views,
            Page::Views => Page::Vehicles,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Vehicles => Page::Views,
            Page::Sources => Page::Vehicles,
            Page::Views => Page::Sources,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Vehicles => "Vehicles",
            Page::Sources => "Sources",
            Page::Views => "Views",
        }
    }
}

pub struct App {
    pub vehicles: Vec<VehicleRecord>,
    pub stats: VehicleStats,
    pub source_stats: Vec<SourceStat>,
    pub state: TableState,
    pub sources_state: TableState,
    pub views_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub view: VehicleView,
    pub sort: SortOrder,
    pub status: Option<String>,
}

impl App {
    pub fn new(
        vehicles: Vec<VehicleRecord>,
        stats: VehicleStats,
        source_stats: Vec<SourceStat>,
        view: VehicleView,
        sort: SortOrder,
    ) -> Self {
        let mut state = TableState::default();
        if !vehicles.is_empty() {
            state.select(Some(0));
        }

        let mut sources_state = TableState::default();
        sources_state.select(Some(0));

        let mut views_state = TableState::default();
        views_state.select(VehicleView::ALL.iter().position(|v| *v == view));

        Self {
            vehicles,
            stats,
            source_stats,
            state,
            sources_state,
            views_state,
            current_page: Page::Vehicles,
            show_detail: false,
            view,
            sort,
            status: None,
        }
    }

    /// Build from the store with the given view and sort
    pub fn load(conn: &Connection, view: VehicleView, sort: SortOrder) -> Result<Self> {
        Ok(Self::new(
            store::list_vehicles(conn, view, sort)?,
            store::vehicle_stats(conn)?,
            store::stats_by_source(conn)?,
            view,
            sort,
        ))
    }

    /// Re-query the store, keeping the selected VIN when it is still listed
    pub fn reload(&mut self, conn: &Connection) -> Result<()> {
        let selected_vin = self.selected_vehicle().map(|v| v.vin.clone());

        self.vehicles = store::list_vehicles(conn, self.view, self.sort)?;
        self.stats = store::vehicle_stats(conn)?;
        self.source_stats = store::stats_by_source(conn)?;

        let index = selected_vin
            .and_then(|vin| self.vehicles.iter().position(|v| v.vin == vin))
            .or(if self.vehicles.is_empty() { None } else { Some(0) });
        self.state.select(index);

        Ok(())
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_vehicle(&self) -> Option<&VehicleRecord> {
        self.state.selected().and_then(|i| self.vehicles.get(i))
    }

    pub fn apply_view(&mut self, conn: &Connection, view: VehicleView) -> Result<()> {
        self.view = view;
        self.vehicles = store::list_vehicles(conn, view, self.sort)?;
        self.state
            .select(if self.vehicles.is_empty() { None } else { Some(0) });
        self.views_state
            .select(VehicleView::ALL.iter().position(|v| *v == view));
        self.status = Some(format!("View: {}", view.label()));
        Ok(())
    }

    pub fn cycle_sort(&mut self, conn: &Connection) -> Result<()> {
        let index = SortOrder::ALL
            .iter()
            .position(|s| *s == self.sort)
            .unwrap_or(0);
        self.sort = SortOrder::ALL[(index + 1) % SortOrder::ALL.len()];
        self.status = Some(format!("Sort: {}", self.sort.as_str()));
        self.reload(conn)
    }

    pub fn mark_selected_seen(&mut self, conn: &Connection) -> Result<()> {
        let vin = match self.selected_vehicle() {
            Some(v) => v.vin.clone(),
            None => return Ok(()),
        };

        store::mark_seen(conn, &vin)?;
        self.status = Some(format!("Marked {} as seen", vin));
        self.reload(conn)
    }

    pub fn toggle_selected_watch(&mut self, conn: &Connection) -> Result<()> {
        let vin = match self.selected_vehicle() {
            Some(v) => v.vin.clone(),
            None => return Ok(()),
        };

        self.status = match store::toggle_watch(conn, &vin)? {
            Some(true) => Some(format!("Watching {}", vin)),
            Some(false) => Some(format!("Stopped watching {}", vin)),
            None => Some(format!("{} is no longer stored", vin)),
        };
        self.reload(conn)
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + PAGE_JUMP).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| i.saturating_sub(PAGE_JUMP));
        state.select(Some(i));
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Vehicles => (&mut self.state, self.vehicles.len()),
            Page::Sources => (&mut self.sources_state, self.source_stats.len()),
            Page::Views => (&mut self.views_state, VehicleView::ALL.len()),
        }
    }

    fn highlighted_view(&self) -> Option<VehicleView> {
        self.views_state
            .selected()
            .and_then(|i| VehicleView::ALL.get(i).copied())
    }
}

pub fn run_ui(app: &mut App, conn: &Connection) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, conn);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    conn: &Connection,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Views => {
                    if let Some(view) = app.highlighted_view() {
                        app.apply_view(conn, view)?;
                        app.current_page = Page::Vehicles;
                    }
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('c') => {
                    app.apply_view(conn, VehicleView::All)?;
                    app.current_page = Page::Vehicles;
                }
                KeyCode::Char('o') => app.cycle_sort(conn)?,
                KeyCode::Char('r') => {
                    app.reload(conn)?;
                    app.status = Some("Reloaded".to_string());
                }
                KeyCode::Char('s') if app.current_page == Page::Vehicles => {
                    app.mark_selected_seen(conn)?
                }
                KeyCode::Char('w') if app.current_page == Page::Vehicles => {
                    app.toggle_selected_watch(conn)?
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    if !app.vehicles.is_empty() {
                        app.state.select(Some(app.vehicles.len() - 1));
                    }
                }
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

    if app.show_detail && app.current_page == Page::Vehicles {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_vehicles(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Vehicles => render_vehicles(f, chunks[1], app),
            Page::Sources => render_sources(f, chunks[1], app),
            Page::Views => render_views(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Vehicles, Page::Sources, Page::Views].iter().enumerate() {
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

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", app.stats.total),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Manual: {}", app.stats.manual),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("1st gen: {}", app.stats.first_gen),
        Style::default().fg(Color::Cyan),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Research: {}", app.stats.needs_research),
        Style::default().fg(Color::Magenta),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Unseen: {}", app.stats.unseen),
        Style::default().fg(Color::Yellow),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn verdict_color(vehicle: &VehicleRecord) -> Color {
    if vehicle.is_first_generation {
        Color::Cyan
    } else if vehicle.is_manual {
        Color::Green
    } else if vehicle.needs_research {
        Color::Magenta
    } else {
        Color::Red
    }
}

fn render_vehicles(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["", "VIN", "Year", "Price", "Miles", "Location", "Trans", "Conf", "Source"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.vehicles.iter().map(|v| {
        let color = verdict_color(v);
        let flags = format!(
            "{}{}",
            if v.tracking.is_watched { "★" } else { " " },
            if v.tracking.is_seen { " " } else { "•" }
        );

        let cells = vec![
            Cell::from(flags).style(Style::default().fg(Color::Yellow)),
            Cell::from(v.vin.clone()),
            Cell::from(v.year.map_or_else(|| "?".to_string(), |y| y.to_string())),
            Cell::from(format_price(v.price)),
            Cell::from(format_miles(v.mileage)),
            Cell::from(truncate(&v.location(), 20)),
            Cell::from(truncate(&v.transmission_type, 16)).style(Style::default().fg(color)),
            Cell::from(format!("{}%", v.confidence)).style(Style::default().fg(color)),
            Cell::from(v.manual_source.as_str()),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(18),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(21),
            Constraint::Length(17),
            Constraint::Length(5),
            Constraint::Length(22),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} · sorted by {} ", app.view.label(), app.sort.as_str())),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_sources(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Source", "Vehicles", "Manual", "Avg Conf", "Meaning"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.source_stats.iter().map(|stat| {
        let color = if stat.manual_count > 0 { Color::Green } else { Color::White };

        Row::new(vec![
            Cell::from(stat.manual_source.as_str()),
            Cell::from(stat.count.to_string()),
            Cell::from(stat.manual_count.to_string()).style(Style::default().fg(color)),
            Cell::from(format!("{:.1}%", stat.avg_confidence)),
            Cell::from(stat.description()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Sources - How each verdict was reached "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.sources_state);
}

fn render_views(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = VehicleView::ALL.iter().map(|view| {
        let marker = if *view == app.view {
            Span::styled("●", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            Span::raw(" ")
        };

        Row::new(vec![
            Cell::from(Line::from(marker)),
            Cell::from(view.label()),
            Cell::from(view.as_str()).style(Style::default().fg(Color::DarkGray)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [Constraint::Length(2), Constraint::Length(30), Constraint::Min(10)],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Views - Enter to apply, c to clear "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.views_state);
}

fn detail_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn section_title(title: &str) -> Line<'static> {
    Line::from(vec![Span::styled(
        format!("  {}", title),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let v = match app.selected_vehicle() {
        Some(v) => v,
        None => {
            let no_selection = Paragraph::new("No vehicle selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Vehicle Details "),
            );
            f.render_widget(no_selection, area);
            return;
        }
    };

    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    let mut content = vec![
        Line::from(""),
        detail_line("VIN", v.vin.clone()),
        detail_line("Year", v.year.map_or_else(|| "?".to_string(), |y| y.to_string())),
        detail_line("Price", format_price(v.price)),
        detail_line("Mileage", format_miles(v.mileage)),
        detail_line("Location", v.location()),
        detail_line("Dealer", or_dash(&v.dealer_name)),
        detail_line("Trim", or_dash(&v.trim)),
        detail_line("Color", or_dash(&v.exterior_color)),
        detail_line(
            "Distance",
            v.distance_from_origin
                .map_or_else(|| "-".to_string(), |d| format!("{:.0} mi", d)),
        ),
        Line::from(""),
        section_title("VERDICT"),
        Line::from(""),
        Line::from(vec![
            Span::styled(
                "  Transmission: ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(v.transmission_type.clone(), Style::default().fg(verdict_color(v))),
        ]),
        detail_line("Source", v.manual_source.as_str().to_string()),
        detail_line("Confidence", format!("{}%", v.confidence)),
        detail_line("Model code", or_dash(&v.model_code)),
        detail_line("Decoded", or_dash(&v.decoded_transmission)),
        detail_line("Engine", or_dash(&v.engine_info)),
    ];

    if v.needs_research {
        content.push(Line::from(vec![Span::styled(
            "  ⚠ Needs manual research",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )]));
    }

    content.push(Line::from(""));
    content.push(section_title("REASON"));
    content.push(Line::from(""));
    content.push(Line::from(vec![
        Span::raw("  "),
        Span::styled(
            wrap_text(&v.reason, 35),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
    ]));

    content.push(Line::from(""));
    content.push(section_title("TRACKING"));
    content.push(Line::from(""));
    content.push(detail_line(
        "First seen",
        v.tracking
            .first_seen
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string()),
    ));
    content.push(detail_line(
        "On market",
        v.days_on_market(Utc::now())
            .map_or_else(|| "-".to_string(), |d| format!("{} days", d)),
    ));
    content.push(detail_line(
        "Watched",
        if v.tracking.is_watched { "yes" } else { "no" }.to_string(),
    ));
    content.push(Line::from(""));
    content.push(Line::from(vec![Span::styled(
        "  s seen · w watch · Enter close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )]));

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Vehicle Details "),
    );

    f.render_widget(detail_panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Vehicles => (app.state.selected(), app.vehicles.len()),
        Page::Sources => (app.sources_state.selected(), app.source_stats.len()),
        Page::Views => (app.views_state.selected(), VehicleView::ALL.len()),
    };

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = &app.status {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(status.clone(), Style::default().fg(Color::Green)));
    }

    for (key, action) in [
        ("Enter", " Details"),
        ("Tab", " Page"),
        ("s", " Seen"),
        ("w", " Watch"),
        ("o", " Sort"),
        ("r", " Reload"),
    ] {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(action));
    }
    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn format_price(price: i64) -> String {
    if price > 0 {
        format!("${}", price)
    } else {
        "-".to_string()
    }
}

fn format_miles(mileage: i64) -> String {
    if mileage > 0 {
        format!("{}k", mileage / 1000)
    } else {
        "-".to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current_line));
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }
    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines.join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_hunter::reconcile::ReconciliationEngine;
    use manual_hunter::{Listing, PatternClassifier};
    use serde_json::json;

    fn seeded_store(vins: &[(&str, i64)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();

        let classifier = PatternClassifier::default();
        let engine = ReconciliationEngine::default();
        for (vin, price) in vins {
            let listing = Listing::from_value(json!({ "vin": vin, "price": price }));
            let record = engine.finalize(&listing, &classifier.classify(vin), None);
            store::upsert_at(&conn, &record, Utc::now()).unwrap();
        }
        conn
    }

    fn three_vehicle_app() -> (Connection, App) {
        let conn = seeded_store(&[
            ("JT3LN130XL0012345", 9000),
            ("JT3VN39W5R8012345", 7000),
            ("JT3HN86R7W0175125", 8000),
        ]);
        let app = App::load(&conn, VehicleView::All, SortOrder::Price).unwrap();
        (conn, app)
    }

    #[test]
    fn test_page_cycle() {
        assert_eq!(Page::Vehicles.next(), Page::Sources);
        assert_eq!(Page::Views.next(), Page::Vehicles);
        assert_eq!(Page::Vehicles.previous(), Page::Views);
        for page in [Page::Vehicles, Page::Sources, Page::Views] {
            assert_eq!(page.next().previous(), page);
        }
    }

    #[test]
    fn test_load_sorted_by_price() {
        let (_conn, app) = three_vehicle_app();

        let prices: Vec<i64> = app.vehicles.iter().map(|v| v.price).collect();
        assert_eq!(prices, vec![7000, 8000, 9000]);
        assert_eq!(app.state.selected(), Some(0));
        assert_eq!(app.stats.total, 3);
    }

    #[test]
    fn test_navigation_wraps() {
        let (_conn, mut app) = three_vehicle_app();

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));

        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_navigation_follows_current_page() {
        let (_conn, mut app) = three_vehicle_app();
        app.next_page();
        app.next_page();
        assert_eq!(app.current_page, Page::Views);

        app.next();
        assert_eq!(app.highlighted_view(), Some(VehicleView::ALL[1]));
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_empty_store() {
        let conn = seeded_store(&[]);
        let mut app = App::load(&conn, VehicleView::All, SortOrder::Price).unwrap();

        assert_eq!(app.state.selected(), None);
        app.next();
        app.page_down();
        assert!(app.selected_vehicle().is_none());
        app.mark_selected_seen(&conn).unwrap();
        app.toggle_selected_watch(&conn).unwrap();
    }

    #[test]
    fn test_apply_view_filters() {
        let (conn, mut app) = three_vehicle_app();

        app.apply_view(&conn, VehicleView::Automatic).unwrap();
        assert_eq!(app.view, VehicleView::Automatic);
        assert_eq!(app.vehicles.len(), 1);
        assert_eq!(app.vehicles[0].vin, "JT3HN86R7W0175125");

        app.apply_view(&conn, VehicleView::Watched).unwrap();
        assert!(app.vehicles.is_empty());
        assert_eq!(app.state.selected(), None);
    }

    #[test]
    fn test_watch_and_seen_persist() {
        let (conn, mut app) = three_vehicle_app();
        app.next();
        let vin = app.selected_vehicle().unwrap().vin.clone();

        app.toggle_selected_watch(&conn).unwrap();
        assert_eq!(app.selected_vehicle().unwrap().vin, vin);
        assert!(app.selected_vehicle().unwrap().tracking.is_watched);
        assert_eq!(app.stats.watched, 1);

        app.mark_selected_seen(&conn).unwrap();
        let stored = store::get_vehicle(&conn, &vin).unwrap().unwrap();
        assert!(stored.tracking.is_seen);
        assert!(stored.tracking.is_watched);

        app.toggle_selected_watch(&conn).unwrap();
        assert!(!store::get_vehicle(&conn, &vin).unwrap().unwrap().tracking.is_watched);
    }

    #[test]
    fn test_cycle_sort_keeps_selection() {
        let (conn, mut app) = three_vehicle_app();
        app.next();
        let vin = app.selected_vehicle().unwrap().vin.clone();

        app.cycle_sort(&conn).unwrap();
        assert_eq!(app.sort, SortOrder::Year);
        assert_eq!(app.selected_vehicle().unwrap().vin, vin);

        for _ in 0..SortOrder::ALL.len() - 1 {
            app.cycle_sort(&conn).unwrap();
        }
        assert_eq!(app.sort, SortOrder::Price);
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(truncate("Boise, ID", 20), "Boise, ID");
        assert_eq!(truncate("Salt Lake City, Utah", 10), "Salt La...");
        assert_eq!(format_price(0), "-");
        assert_eq!(format_miles(187_400), "187k");
        assert_eq!(wrap_text("one two three", 7), "one two\n  three");
    }
}
