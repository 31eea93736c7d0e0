use std::cell::{Cell, RefCell};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::Options as WrapOptions;
use unicode_width::UnicodeWidthStr;

use crate::comments::{Comment, CommentId, OrphanPolicy};
use crate::data::{SortMode, Story, StoryPager, StoryQuery, StoryService, StoryThread, SORT_MODES};
use crate::focus::{FocusMode, FocusTarget, Transition};
use crate::navigator::{Action, InputContext, Navigator, Response};
use crate::thread::LoadOutcome;
use crate::visible::VisibleComment;

const COLOR_BG: Color = Color::Rgb(18, 18, 22);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 30);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(40, 42, 54);
const COLOR_BORDER_IDLE: Color = Color::Rgb(60, 60, 72);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(255, 102, 0);
const COLOR_ACCENT: Color = Color::Rgb(255, 102, 0);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(230, 230, 235);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(150, 150, 165);

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const STORY_ROW_HEIGHT: usize = 2;
const STORY_PRELOAD_THRESHOLD: usize = 5;
const TICK: Duration = Duration::from_millis(16);

pub struct Options {
    pub service: Arc<dyn StoryService>,
    pub source_label: String,
    pub topics: Vec<String>,
    pub default_sort: SortMode,
    pub page_size: usize,
    pub orphan_policy: OrphanPolicy,
    pub focus_delay: Duration,
}

enum AsyncResponse {
    Stories {
        generation: u64,
        result: Result<Vec<Story>>,
    },
    Thread {
        request_id: u64,
        story_id: i64,
        result: Result<StoryThread>,
    },
}

struct PendingThread {
    request_id: u64,
    story_id: i64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScreenLayout {
    header: Rect,
    sidebar: Rect,
    stories: Rect,
    thread: Rect,
}

/// Screen rows occupied by one rendered comment, recorded at draw time for
/// pointer hit-testing.
#[derive(Debug, Clone, Copy)]
struct CommentHit {
    id: CommentId,
    top: u16,
    height: u16,
    toggle_end: u16,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }
}

pub struct Model {
    service: Arc<dyn StoryService>,
    source_label: String,
    navigator: Navigator,
    stories: Vec<Story>,
    pager: StoryPager,
    story_cursor: usize,
    story_offset: Cell<usize>,
    opened_story: Option<Story>,
    sort: SortMode,
    header_cursor: usize,
    topics: Vec<String>,
    active_topic: Option<String>,
    sidebar_cursor: usize,
    topic_input: Option<String>,
    status_message: String,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_thread: Option<PendingThread>,
    thread_offset: Cell<usize>,
    reveal_active: Cell<bool>,
    layout: Cell<ScreenLayout>,
    header_hits: RefCell<Vec<(u16, u16)>>,
    comment_hits: RefCell<Vec<CommentHit>>,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let header_cursor = SORT_MODES
            .iter()
            .position(|mode| *mode == options.default_sort)
            .unwrap_or(0);
        let mut model = Self {
            service: options.service,
            source_label: options.source_label,
            navigator: Navigator::new(options.orphan_policy, options.focus_delay),
            stories: Vec::new(),
            pager: StoryPager::new(options.page_size),
            story_cursor: 0,
            story_offset: Cell::new(0),
            opened_story: None,
            sort: options.default_sort,
            header_cursor,
            topics: options.topics,
            active_topic: None,
            sidebar_cursor: 0,
            topic_input: None,
            status_message: "Loading stories...".to_string(),
            response_tx,
            response_rx,
            next_request_id: 1,
            pending_thread: None,
            thread_offset: Cell::new(0),
            reveal_active: Cell::new(false),
            layout: Cell::new(ScreenLayout::default()),
            header_hits: RefCell::new(Vec::new()),
            comment_hits: RefCell::new(Vec::new()),
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.request_more_stories();
        model
    }

    pub fn run(mut self) -> Result<()> {
        let mut guard = TerminalGuard::new()?;
        let result = self.event_loop(guard.terminal_mut());
        drop(guard);
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.poll_async();
            self.poll_focus(Instant::now());
            if self.is_loading() && self.spinner.advance() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            if !event::poll(TICK)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key(key) {
                        break;
                    }
                }
                Event::Mouse(mouse) => self.handle_mouse(mouse),
                Event::Resize(_, _) => self.mark_dirty(),
                _ => {}
            }
        }
        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pager.is_loading() || self.navigator.thread().is_loading()
    }

    fn query(&self) -> StoryQuery {
        StoryQuery {
            sort: self.sort,
            topics: self.active_topic.iter().cloned().collect(),
        }
    }

    /// Index of the open story within the current list.
    fn opened_story_index(&self) -> Option<usize> {
        let id = self.opened_story.as_ref()?.id;
        self.stories.iter().position(|story| story.id == id)
    }

    fn input_context(&self) -> InputContext {
        InputContext {
            text_input_active: self.topic_input.is_some(),
            selected_story: self.opened_story_index(),
        }
    }

    // Returns true when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        if self.topic_input.is_some() {
            self.handle_topic_input(key);
            self.mark_dirty();
            return false;
        }

        let input = self.input_context();
        let response = self.navigator.handle_key(key, &input, Instant::now());
        let quit = match response {
            Response::Ignored => self.handle_surface_key(key),
            other => {
                self.apply_response(other);
                false
            }
        };
        self.mark_dirty();
        quit
    }

    fn apply_response(&mut self, response: Response) {
        match response {
            Response::Ignored | Response::Handled => {}
            Response::Reveal(_) => self.reveal_active.set(true),
            Response::Focus(Transition::Moved { to, .. }) => {
                self.status_message = focus_status_for(to);
            }
            Response::Focus(_) => {
                if self.navigator.focus_mode() == Some(FocusMode::List)
                    && self.opened_story.is_none()
                {
                    self.status_message = "Open a story with Enter first.".to_string();
                }
            }
        }
    }

    // Keys the navigator left alone: list, sidebar and header controls plus
    // the global commands.
    fn handle_surface_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('r') => self.reload_stories(),
            KeyCode::Char('R') => self.reload_thread(),
            KeyCode::Char('o') => self.open_story_link(),
            _ => match self.navigator.focus_mode() {
                Some(FocusMode::List) => self.handle_list_key(key),
                Some(FocusMode::Sidebar) => self.handle_sidebar_key(key),
                Some(FocusMode::Header) => self.handle_header_key(key),
                Some(FocusMode::Thread) | None => {}
            },
        }
        false
    }

    fn handle_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_story_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_story_cursor(-1),
            KeyCode::PageDown => self.move_story_cursor(10),
            KeyCode::PageUp => self.move_story_cursor(-10),
            KeyCode::Enter => self.open_story(self.story_cursor),
            _ => {}
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if self.sidebar_cursor + 1 < self.topics.len() {
                    self.sidebar_cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.sidebar_cursor = self.sidebar_cursor.saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.toggle_topic(self.sidebar_cursor),
            KeyCode::Char('a') => {
                self.topic_input = Some(String::new());
                self.status_message = "New topic: type a name, Enter to add, Esc to cancel.".into();
            }
            KeyCode::Char('x') | KeyCode::Delete => self.remove_topic(self.sidebar_cursor),
            _ => {}
        }
    }

    fn handle_header_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => {
                self.header_cursor = self.header_cursor.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Right => {
                if self.header_cursor + 1 < SORT_MODES.len() {
                    self.header_cursor += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.apply_sort(self.header_cursor),
            _ => {}
        }
    }

    fn handle_topic_input(&mut self, key: KeyEvent) {
        let Some(value) = self.topic_input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.topic_input = None;
                self.status_message = "Topic entry cancelled.".into();
            }
            KeyCode::Backspace => {
                value.pop();
            }
            KeyCode::Char(ch) => value.push(ch),
            KeyCode::Enter => {
                let topic = value.trim().to_string();
                if topic.is_empty() {
                    self.status_message = "Topic name cannot be empty.".into();
                } else if self.topics.iter().any(|t| t.eq_ignore_ascii_case(&topic)) {
                    self.status_message = format!("Topic {topic} is already listed.");
                } else {
                    tracing::info!(%topic, "topic added");
                    self.topics.push(topic.clone());
                    self.sidebar_cursor = self.topics.len() - 1;
                    self.topic_input = None;
                    self.status_message = format!("Added topic {topic}.");
                }
            }
            _ => {}
        }
    }

    fn toggle_topic(&mut self, index: usize) {
        let Some(topic) = self.topics.get(index).cloned() else {
            return;
        };
        if self.active_topic.as_deref() == Some(topic.as_str()) {
            self.active_topic = None;
            self.status_message = "Showing all topics.".into();
        } else {
            self.status_message = format!("Filtering by {topic}.");
            self.active_topic = Some(topic);
        }
        self.reload_stories();
    }

    fn remove_topic(&mut self, index: usize) {
        if index >= self.topics.len() {
            return;
        }
        let removed = self.topics.remove(index);
        if self.sidebar_cursor >= self.topics.len() {
            self.sidebar_cursor = self.topics.len().saturating_sub(1);
        }
        self.status_message = format!("Removed topic {removed}.");
        if self.active_topic.as_deref() == Some(removed.as_str()) {
            self.active_topic = None;
            self.reload_stories();
        }
    }

    fn apply_sort(&mut self, index: usize) {
        let Some(mode) = SORT_MODES.get(index).copied() else {
            return;
        };
        self.header_cursor = index;
        if mode == self.sort {
            return;
        }
        self.sort = mode;
        self.status_message = format!("Sorted by {}.", mode.label());
        self.reload_stories();
    }

    fn move_story_cursor(&mut self, delta: isize) {
        if self.stories.is_empty() {
            return;
        }
        let last = self.stories.len() - 1;
        self.story_cursor = self.story_cursor.saturating_add_signed(delta).min(last);
        if self.story_cursor + STORY_PRELOAD_THRESHOLD >= self.stories.len() {
            self.request_more_stories();
        }
    }

    fn reload_stories(&mut self) {
        self.pager.reset();
        self.stories.clear();
        self.story_cursor = 0;
        self.story_offset.set(0);
        self.request_more_stories();
    }

    fn request_more_stories(&mut self) {
        let Some(request) = self.pager.next_page() else {
            return;
        };
        let service = Arc::clone(&self.service);
        let query = self.query();
        let tx = self.response_tx.clone();
        tracing::debug!(offset = request.offset, limit = request.limit, "requesting stories");
        thread::spawn(move || {
            let result = service.stories(&query, request.offset, request.limit);
            let _ = tx.send(AsyncResponse::Stories {
                generation: request.generation,
                result,
            });
        });
        self.mark_dirty();
    }

    /// Opens the story under the cursor, or closes it when it is already
    /// open.
    fn open_story(&mut self, index: usize) {
        let Some(story) = self.stories.get(index).cloned() else {
            return;
        };
        if self.opened_story.as_ref().map(|s| s.id) == Some(story.id) {
            self.close_story();
            return;
        }
        self.status_message = format!("Loading discussion for {}", story.title);
        self.opened_story = Some(story);
        self.thread_offset.set(0);
        self.reload_thread();
    }

    fn close_story(&mut self) {
        self.opened_story = None;
        self.pending_thread = None;
        self.navigator.thread_mut().close();
        if self.navigator.focus().pending() == Some(FocusTarget::ThreadContainer) {
            self.navigator.focus_mut().cancel_pending();
        }
        if self.navigator.focus_mode() == Some(FocusMode::Thread) {
            self.navigator.set_focus_mode(FocusMode::List);
        }
        self.status_message = "Discussion closed.".into();
    }

    fn reload_thread(&mut self) {
        let Some(story_id) = self.opened_story.as_ref().map(|story| story.id) else {
            return;
        };
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.pending_thread = Some(PendingThread {
            request_id,
            story_id,
        });
        self.navigator.thread_mut().begin_load(story_id);

        let service = Arc::clone(&self.service);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.thread(story_id);
            let _ = tx.send(AsyncResponse::Thread {
                request_id,
                story_id,
                result,
            });
        });
        self.mark_dirty();
    }

    fn open_story_link(&mut self) {
        let story = match self.navigator.focus_mode() {
            Some(FocusMode::List) => self.stories.get(self.story_cursor),
            _ => self.opened_story.as_ref(),
        };
        let Some(link) = story.map(Story::link) else {
            return;
        };
        self.status_message = match webbrowser::open(&link) {
            Ok(_) => format!("Opened {link}"),
            Err(err) => format!("Failed to open browser: {err}"),
        };
        self.mark_dirty();
    }

    fn poll_async(&mut self) {
        while let Ok(message) = self.response_rx.try_recv() {
            match message {
                AsyncResponse::Stories { generation, result } => {
                    self.apply_stories(generation, result)
                }
                AsyncResponse::Thread {
                    request_id,
                    story_id,
                    result,
                } => self.apply_thread(request_id, story_id, result),
            }
            self.mark_dirty();
        }
    }

    fn apply_stories(&mut self, generation: u64, result: Result<Vec<Story>>) {
        match result {
            Ok(batch) => {
                if !self.pager.complete(generation, batch.len()) {
                    return;
                }
                self.stories.extend(batch);
                self.status_message = if self.stories.is_empty() {
                    "No stories found.".to_string()
                } else {
                    format!("{} stories from {}", self.stories.len(), self.source_label)
                };
                if !self.stories.is_empty() && !self.navigator.focus().is_active() {
                    self.navigator.focus_mut().activate();
                }
            }
            Err(err) => {
                self.pager.fail(generation);
                tracing::warn!(error = %format!("{err:#}"), "story fetch failed");
                self.status_message = format!("Failed to load stories: {err:#}");
            }
        }
    }

    fn apply_thread(&mut self, request_id: u64, story_id: i64, result: Result<StoryThread>) {
        let current = self
            .pending_thread
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id);
        if !current {
            tracing::debug!(story_id, request_id, "superseded thread response dropped");
            return;
        }
        self.pending_thread = None;

        let comments = match result {
            Ok(thread) => {
                if let Some(open) = self.opened_story.as_mut() {
                    if open.id == thread.story.id {
                        *open = thread.story;
                    }
                }
                thread.comments
            }
            Err(err) => {
                tracing::warn!(story_id, error = %format!("{err:#}"), "thread fetch failed");
                self.status_message = format!("Failed to load discussion: {err:#}");
                Vec::new()
            }
        };
        let loaded = comments.len();
        match self.navigator.thread_mut().finish_load(story_id, comments) {
            LoadOutcome::Applied => {
                if loaded > 0 {
                    self.status_message = format!("Loaded {loaded} comments.");
                }
                self.reveal_active.set(true);
            }
            LoadOutcome::Stale => {}
            LoadOutcome::Rejected(err) => {
                self.status_message = format!("Discussion could not be shown: {err}");
            }
        }
    }

    fn poll_focus(&mut self, now: Instant) {
        let story_count = self.stories.len();
        let topic_count = self.topics.len();
        let thread_drawn = self.opened_story.is_some() && self.layout.get().thread.height > 0;
        let fired = self.navigator.focus_mut().poll(now, |target| match target {
            FocusTarget::ThreadContainer => thread_drawn,
            FocusTarget::ListItem(index) => index < story_count,
            FocusTarget::SidebarFirstControl => topic_count > 0,
            FocusTarget::HeaderFirstControl => true,
        });
        if let Some(target) = fired {
            self.apply_focus_target(target);
            self.mark_dirty();
        }
    }

    fn apply_focus_target(&mut self, target: FocusTarget) {
        match target {
            FocusTarget::ThreadContainer => self.reveal_active.set(true),
            FocusTarget::ListItem(index) => self.story_cursor = index,
            FocusTarget::SidebarFirstControl => self.sidebar_cursor = 0,
            FocusTarget::HeaderFirstControl => self.header_cursor = 0,
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let layout = self.layout.get();
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if contains(layout.thread, column, row) {
                    self.click_thread(column, row);
                } else if contains(layout.stories, column, row) {
                    self.click_story(row);
                } else if contains(layout.sidebar, column, row) {
                    self.click_topic(row);
                } else if contains(layout.header, column, row) {
                    self.click_sort(column);
                }
            }
            MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
                let down = matches!(mouse.kind, MouseEventKind::ScrollDown);
                if contains(layout.thread, column, row) {
                    self.navigator.set_focus_mode(FocusMode::Thread);
                    if self.navigator.focus_mode() != Some(FocusMode::Thread) {
                        return;
                    }
                    let action = if down {
                        Action::NextComment
                    } else {
                        Action::PreviousComment
                    };
                    let input = self.input_context();
                    let response = self.navigator.apply(action, &input, Instant::now());
                    self.apply_response(response);
                } else if contains(layout.stories, column, row) {
                    self.move_story_cursor(if down { 1 } else { -1 });
                }
            }
            _ => return,
        }
        self.mark_dirty();
    }

    fn click_thread(&mut self, column: u16, row: u16) {
        let hit = self
            .comment_hits
            .borrow()
            .iter()
            .find(|hit| row >= hit.top && row < hit.top + hit.height)
            .copied();
        let Some(hit) = hit else {
            return;
        };
        let response = if row == hit.top && column < hit.toggle_end {
            self.navigator.click_toggle(hit.id)
        } else {
            self.navigator.click_comment(hit.id)
        };
        self.apply_response(response);
    }

    fn click_story(&mut self, row: u16) {
        let inner = pane_inner(self.layout.get().stories);
        if row < inner.y {
            return;
        }
        let index = self.story_offset.get() + (row - inner.y) as usize / STORY_ROW_HEIGHT;
        if index >= self.stories.len() {
            return;
        }
        self.navigator.set_focus_mode(FocusMode::List);
        self.story_cursor = index;
        self.open_story(index);
    }

    fn click_topic(&mut self, row: u16) {
        let inner = pane_inner(self.layout.get().sidebar);
        if row < inner.y {
            return;
        }
        let index = (row - inner.y) as usize;
        if index >= self.topics.len() {
            return;
        }
        self.navigator.set_focus_mode(FocusMode::Sidebar);
        self.sidebar_cursor = index;
        self.toggle_topic(index);
    }

    fn click_sort(&mut self, column: u16) {
        let index = self
            .header_hits
            .borrow()
            .iter()
            .position(|(start, end)| column >= *start && column < *end);
        if let Some(index) = index {
            self.navigator.set_focus_mode(FocusMode::Header);
            self.apply_sort(index);
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let area = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(area);
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(18),
                Constraint::Percentage(37),
                Constraint::Percentage(45),
            ])
            .split(rows[1]);

        self.layout.set(ScreenLayout {
            header: rows[0],
            sidebar: panes[0],
            stories: panes[1],
            thread: panes[2],
        });

        self.draw_header(frame, rows[0]);
        self.draw_sidebar(frame, panes[0]);
        self.draw_stories(frame, panes[1]);
        self.draw_thread(frame, panes[2]);
        self.draw_footer(frame, rows[2]);
    }

    fn pane_block(&self, mode: FocusMode, title: String) -> Block<'static> {
        let focused = self.navigator.focus_mode() == Some(mode);
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(FocusMode::Header, " HN Station ".to_string());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let focused = self.navigator.focus_mode() == Some(FocusMode::Header);
        let mut spans = Vec::new();
        let mut hits = Vec::with_capacity(SORT_MODES.len());
        let mut x = inner.x;
        for (index, mode) in SORT_MODES.iter().enumerate() {
            let label = format!(" {} ", mode.label());
            let width = UnicodeWidthStr::width(label.as_str()) as u16;
            let mut style = Style::default().fg(COLOR_TEXT_SECONDARY);
            if *mode == self.sort {
                style = style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
            }
            if focused && index == self.header_cursor {
                style = style.bg(COLOR_PANEL_SELECTED_BG);
            }
            hits.push((x, x.saturating_add(width)));
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
            x = x.saturating_add(width + 1);
        }
        if let Some(topic) = &self.active_topic {
            spans.push(Span::styled(
                format!("  # {topic}"),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ));
        }
        *self.header_hits.borrow_mut() = hits;
        frame.render_widget(Paragraph::new(Line::from(spans)), inner);
    }

    fn draw_sidebar(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(FocusMode::Sidebar, " Topics ".to_string());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let focused = self.navigator.focus_mode() == Some(FocusMode::Sidebar);
        let mut lines: Vec<Line<'static>> = self
            .topics
            .iter()
            .enumerate()
            .map(|(index, topic)| {
                let mut style = Style::default().fg(COLOR_TEXT_PRIMARY);
                if self.active_topic.as_deref() == Some(topic.as_str()) {
                    style = style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
                }
                if focused && index == self.sidebar_cursor {
                    style = style.bg(COLOR_PANEL_SELECTED_BG);
                }
                Line::from(Span::styled(format!("# {topic}"), style))
            })
            .collect();
        match &self.topic_input {
            Some(value) => lines.push(Line::from(Span::styled(
                format!("+ {value}▏"),
                Style::default().fg(COLOR_ACCENT),
            ))),
            None if focused => lines.push(Line::from(Span::styled(
                "a: add topic",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))),
            None => {}
        }
        pad_lines_to_width(&mut lines, inner.width);
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_stories(&self, frame: &mut Frame<'_>, area: Rect) {
        let mut title = format!(" Stories ({}) ", self.stories.len());
        if self.pager.is_loading() {
            title = format!(" Stories ({}) {} ", self.stories.len(), self.spinner.frame());
        }
        let block = self.pane_block(FocusMode::List, title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.stories.is_empty() {
            let text = if self.pager.is_loading() {
                "Loading stories..."
            } else {
                "No stories."
            };
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                inner,
            );
            return;
        }

        let capacity = (inner.height as usize / STORY_ROW_HEIGHT).max(1);
        let offset = scroll_to_keep(self.story_offset.get(), self.story_cursor, capacity);
        self.story_offset.set(offset);

        let focused = self.navigator.focus_mode() == Some(FocusMode::List);
        let opened = self.opened_story.as_ref().map(|story| story.id);
        let now = Utc::now();
        let mut lines = Vec::with_capacity(capacity * STORY_ROW_HEIGHT);
        for (index, story) in self.stories.iter().enumerate().skip(offset).take(capacity) {
            let selected = focused && index == self.story_cursor;
            let mut title_style = Style::default().fg(COLOR_TEXT_PRIMARY);
            if opened == Some(story.id) {
                title_style = title_style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
            }
            let mut meta_style = Style::default().fg(COLOR_TEXT_SECONDARY);
            if selected {
                title_style = title_style.bg(COLOR_PANEL_SELECTED_BG);
                meta_style = meta_style.bg(COLOR_PANEL_SELECTED_BG);
            }
            let mut title = format!("{}. {}", index + 1, story.title);
            if let Some(domain) = story.domain() {
                title.push_str(&format!(" ({domain})"));
            }
            let meta = format!(
                "   {} points by {} {} | {} comments",
                story.score,
                story.by,
                time_ago(story.time, now),
                story.descendants
            );
            lines.push(Line::from(Span::styled(title, title_style)));
            lines.push(Line::from(Span::styled(meta, meta_style)));
        }
        pad_lines_to_width(&mut lines, inner.width);
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_thread(&self, frame: &mut Frame<'_>, area: Rect) {
        let folded = self.navigator.thread().collapsed_count();
        let title = match &self.opened_story {
            Some(story) if folded > 0 => format!(" {} ({folded} folded) ", story.title),
            Some(story) => format!(" {} ", story.title),
            None => " Discussion ".to_string(),
        };
        let block = self.pane_block(FocusMode::Thread, title);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.comment_hits.borrow_mut().clear();

        let view = self.navigator.thread();
        let placeholder = if self.opened_story.is_none() {
            Some("Select a story and press Enter to read the discussion.".to_string())
        } else if view.is_loading() {
            Some(format!("{} Loading discussion...", self.spinner.frame()))
        } else if view.tree().is_empty() {
            Some("No comments yet.".to_string())
        } else {
            None
        };
        if let Some(text) = placeholder {
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                inner,
            );
            return;
        }

        let rows = view.visible_rows();
        let width = inner.width as usize;
        let now = Utc::now();
        let active = view.active_comment_id();
        let rendered: Vec<(VisibleComment, Vec<Line<'static>>)> = rows
            .iter()
            .filter_map(|row| {
                let comment = view.comment(row.id)?;
                let collapsed = view.is_collapsed(row.id);
                let hidden = if collapsed {
                    view.descendant_count(row.id)
                } else {
                    0
                };
                let has_children = view.tree().has_children(row.id);
                let mut lines = comment_lines(
                    comment,
                    row.depth,
                    has_children,
                    collapsed,
                    hidden,
                    width,
                    now,
                );
                if active == Some(row.id) {
                    for span in lines.iter_mut().flat_map(|line| line.spans.iter_mut()) {
                        span.style = span.style.bg(COLOR_PANEL_SELECTED_BG);
                    }
                    pad_lines_to_width(&mut lines, inner.width);
                }
                Some((*row, lines))
            })
            .collect();

        let heights: Vec<usize> = rendered.iter().map(|(_, lines)| lines.len() + 1).collect();
        let mut offset = self.thread_offset.get().min(rendered.len().saturating_sub(1));
        if self.reveal_active.replace(false) {
            let selected =
                active.and_then(|id| rendered.iter().position(|(row, _)| row.id == id));
            if let Some(selected) = selected {
                offset = centered_offset(&heights, selected, inner.height as usize);
            }
        }
        self.thread_offset.set(offset);

        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut hits = Vec::new();
        let mut y = inner.y;
        let bottom = inner.y.saturating_add(inner.height);
        for (row, comment_lines) in rendered.into_iter().skip(offset) {
            if y >= bottom {
                break;
            }
            let height = comment_lines.len() as u16;
            hits.push(CommentHit {
                id: row.id,
                top: y,
                height: height.min(bottom - y),
                toggle_end: inner.x + (row.depth * 2 + 3) as u16,
            });
            y = y.saturating_add(height + 1);
            lines.extend(comment_lines);
            lines.push(Line::default());
        }
        *self.comment_hits.borrow_mut() = hits;
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_footer(&self, frame: &mut Frame<'_>, area: Rect) {
        let hints = match (self.topic_input.is_some(), self.navigator.focus_mode()) {
            (true, _) => "Enter add · Esc cancel",
            (_, Some(FocusMode::Thread)) => {
                "j/k move · c/Enter fold · ←/→ collapse/expand · C expand all · Ctrl+← list · q quit"
            }
            (_, Some(FocusMode::List)) => {
                "j/k move · Enter open · l thread · h topics · Ctrl+↑ sort · o open link · q quit"
            }
            (_, Some(FocusMode::Sidebar)) => "j/k move · Enter filter · a add · x remove · l list",
            (_, Some(FocusMode::Header)) => "h/l move · Enter sort · j list",
            (_, None) => "r reload · q quit",
        };
        let line = Line::from(vec![
            Span::styled(
                format!(" {} ", self.status_message),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
            Span::styled(
                format!(" {hints}"),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn focus_status_for(mode: FocusMode) -> String {
    match mode {
        FocusMode::Thread => {
            "Focused Discussion. j/k move between comments, c folds a thread.".to_string()
        }
        _ => format!("Focused {}", mode.title()),
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

fn pane_inner(area: Rect) -> Rect {
    Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .inner(area)
}

/// Keeps `cursor` inside a window of `capacity` rows starting at `offset`.
fn scroll_to_keep(offset: usize, cursor: usize, capacity: usize) -> usize {
    if cursor < offset {
        cursor
    } else if cursor >= offset + capacity {
        cursor + 1 - capacity
    } else {
        offset
    }
}

/// Index of the first item to draw so the selected item sits as close to
/// the middle of the pane as the items above it allow.
fn centered_offset(heights: &[usize], selected: usize, available: usize) -> usize {
    if heights.is_empty() || available == 0 {
        return 0;
    }
    let selected = selected.min(heights.len() - 1);
    let selection = heights[selected].max(1);
    let midpoint = available as f32 / 2.0;

    let mut best: Option<(usize, f32)> = None;
    let mut span = 0usize;
    for candidate in (0..=selected).rev() {
        span += heights[candidate].max(1);
        if span > available {
            break;
        }
        let top = span - selection;
        let center = top as f32 + selection as f32 / 2.0;
        let diff = (center - midpoint).abs();
        if best.map_or(true, |(_, current)| diff < current) {
            best = Some((candidate, diff));
        }
    }
    best.map(|(candidate, _)| candidate).unwrap_or(selected)
}

fn comment_lines(
    comment: &Comment,
    depth: usize,
    has_children: bool,
    collapsed: bool,
    hidden: usize,
    width: usize,
    now: DateTime<Utc>,
) -> Vec<Line<'static>> {
    let indent = "  ".repeat(depth);
    let indicator = match (has_children, collapsed) {
        (false, _) => "[·]",
        (true, true) => "[+]",
        (true, false) => "[-]",
    };
    let author = if comment.author.trim().is_empty() {
        "[deleted]"
    } else {
        comment.author.as_str()
    };

    let mut spans = vec![
        Span::styled(
            format!("{indent}{indicator} "),
            Style::default().fg(COLOR_ACCENT),
        ),
        Span::styled(
            author.to_string(),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" · {}", time_ago(comment.timestamp, now)),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ),
    ];
    if collapsed && hidden > 0 {
        let noun = if hidden == 1 { "child" } else { "children" };
        spans.push(Span::styled(
            format!(" ({hidden} {noun})"),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
    }
    let mut lines = vec![Line::from(spans)];
    if collapsed {
        return lines;
    }

    let body_prefix = format!("{indent}    ");
    let body_width = width
        .saturating_sub(UnicodeWidthStr::width(body_prefix.as_str()))
        .max(10);
    let body_style = Style::default().fg(COLOR_TEXT_PRIMARY);
    if comment.body.trim().is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{body_prefix}(no comment body)"),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        return lines;
    }
    for raw_line in comment.body.lines() {
        if raw_line.trim().is_empty() {
            lines.push(Line::default());
            continue;
        }
        for wrapped in textwrap::wrap(raw_line.trim(), WrapOptions::new(body_width)) {
            lines.push(Line::from(Span::styled(
                format!("{body_prefix}{wrapped}"),
                body_style,
            )));
        }
    }
    lines
}

/// Compact age such as `5m` or `3d`; a unit is used once more than one of
/// it has elapsed.
fn time_ago(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(timestamp) = timestamp else {
        return String::new();
    };
    let seconds = (now - timestamp).num_seconds().max(0) as f64;
    const UNITS: [(f64, &str); 5] = [
        (31_536_000.0, "y"),
        (2_592_000.0, "mo"),
        (86_400.0, "d"),
        (3_600.0, "h"),
        (60.0, "m"),
    ];
    for (size, suffix) in UNITS {
        let interval = seconds / size;
        if interval > 1.0 {
            return format!("{}{suffix}", interval.floor() as u64);
        }
    }
    format!("{}s", seconds.floor() as u64)
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }
    for line in lines {
        let current_width: usize = line
            .spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum();
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}

struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;
        Ok(Self { terminal })
    }

    fn terminal_mut(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = self.terminal.backend_mut().execute(DisableMouseCapture);
        let _ = self.terminal.backend_mut().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DemoStoryService;
    use chrono::Duration as ChronoDuration;

    fn model() -> Model {
        let mut model = Model::new(Options {
            service: Arc::new(DemoStoryService::new()),
            source_label: "demo".into(),
            topics: vec!["Rust".into(), "Postgres".into()],
            default_sort: SortMode::Default,
            page_size: 10,
            orphan_policy: OrphanPolicy::Root,
            focus_delay: Duration::from_millis(0),
        });
        wait_for(&mut model, |m| !m.pager.is_loading());
        model
    }

    fn wait_for(model: &mut Model, done: impl Fn(&Model) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(model) && Instant::now() < deadline {
            if let Ok(message) = model.response_rx.recv_timeout(Duration::from_millis(50)) {
                match message {
                    AsyncResponse::Stories { generation, result } => {
                        model.apply_stories(generation, result)
                    }
                    AsyncResponse::Thread {
                        request_id,
                        story_id,
                        result,
                    } => model.apply_thread(request_id, story_id, result),
                }
            }
        }
        assert!(done(model), "timed out waiting for background work");
    }

    fn press(model: &mut Model, code: KeyCode) -> bool {
        model.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn stories_load_and_activate_list_focus() {
        let model = model();
        assert_eq!(model.stories.len(), 3);
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::List));
    }

    #[test]
    fn opening_a_story_then_moving_right_enters_the_thread() {
        let mut model = model();
        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        assert_eq!(model.navigator.active_comment_id(), Some(1));

        press(&mut model, KeyCode::Char('l'));
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::Thread));
        press(&mut model, KeyCode::Char('j'));
        assert_eq!(model.navigator.active_comment_id(), Some(2));
    }

    #[test]
    fn moving_right_without_an_open_story_stays_in_list() {
        let mut model = model();
        press(&mut model, KeyCode::Char('l'));
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::List));
        assert!(model.status_message.contains("Enter"));
    }

    #[test]
    fn pending_focus_moves_list_cursor_to_open_story() {
        let mut model = model();
        press(&mut model, KeyCode::Char('j'));
        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        model.story_cursor = 0;
        model.layout.set(ScreenLayout {
            thread: Rect::new(0, 0, 40, 20),
            ..ScreenLayout::default()
        });
        press(&mut model, KeyCode::Char('l'));
        press(&mut model, KeyCode::Esc);
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::List));
        model.poll_focus(Instant::now() + Duration::from_millis(5));
        assert_eq!(model.story_cursor, 1);
    }

    #[test]
    fn quit_key_is_not_swallowed_by_thread_mode() {
        let mut model = model();
        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        press(&mut model, KeyCode::Char('l'));
        assert!(press(&mut model, KeyCode::Char('q')));
    }

    #[test]
    fn topic_input_captures_every_key() {
        let mut model = model();
        press(&mut model, KeyCode::Char('h'));
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::Sidebar));
        press(&mut model, KeyCode::Char('a'));
        for ch in ['l', 'q', 'j'] {
            assert!(!press(&mut model, KeyCode::Char(ch)));
        }
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::Sidebar));
        press(&mut model, KeyCode::Enter);
        assert_eq!(model.topics.last().map(String::as_str), Some("lqj"));
        assert!(model.topic_input.is_none());
    }

    #[test]
    fn closing_the_open_story_leaves_thread_mode() {
        let mut model = model();
        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        press(&mut model, KeyCode::Enter);
        assert!(model.opened_story.is_none());
        assert_eq!(model.navigator.thread().story_id(), None);
    }

    #[test]
    fn superseded_thread_responses_are_dropped() {
        let mut model = model();
        model.opened_story = model.stories.first().cloned();
        model.reload_thread();
        let first = model.next_request_id - 1;
        model.reload_thread();
        let story_id = model.stories[0].id;
        let thread = DemoStoryService::new().thread(story_id).unwrap();
        model.apply_thread(first, story_id, Ok(thread));
        assert!(model.navigator.thread().is_loading());
    }

    #[test]
    fn centered_offset_puts_selection_mid_pane() {
        let heights = vec![2; 8];
        assert_eq!(centered_offset(&heights, 5, 10), 3);
        assert_eq!(centered_offset(&heights, 0, 10), 0);
        assert_eq!(centered_offset(&[30, 4], 0, 10), 0);
    }

    #[test]
    fn scroll_to_keep_follows_cursor() {
        assert_eq!(scroll_to_keep(0, 3, 5), 0);
        assert_eq!(scroll_to_keep(0, 7, 5), 3);
        assert_eq!(scroll_to_keep(4, 2, 5), 2);
    }

    #[test]
    fn time_ago_picks_the_largest_unit() {
        let now = Utc::now();
        assert_eq!(time_ago(Some(now - ChronoDuration::seconds(30)), now), "30s");
        assert_eq!(time_ago(Some(now - ChronoDuration::seconds(90)), now), "1m");
        assert_eq!(time_ago(Some(now - ChronoDuration::hours(2)), now), "2h");
        assert_eq!(time_ago(Some(now - ChronoDuration::days(3)), now), "3d");
        assert_eq!(time_ago(None, now), "");
    }

    #[test]
    fn collapsed_comment_shows_only_header_with_child_count() {
        let mut comment = Comment::new(1, None);
        comment.author = "alice".into();
        comment.body = "hidden text".into();
        let lines = comment_lines(&comment, 1, true, true, 12, 60, Utc::now());
        assert_eq!(lines.len(), 1);
        let text: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.starts_with("  [+] alice"));
        assert!(text.ends_with("(12 children)"));
    }

    #[test]
    fn expanded_comment_wraps_body() {
        let mut comment = Comment::new(1, None);
        comment.author = "bob".into();
        comment.body = "one two three four five six seven eight nine ten".into();
        let lines = comment_lines(&comment, 0, false, false, 0, 20, Utc::now());
        assert!(lines.len() > 2);
        let header: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(header.starts_with("[·] bob"));
    }

    #[test]
    fn wheel_over_thread_pane_needs_an_open_story() {
        let mut model = model();
        model.layout.set(ScreenLayout {
            thread: Rect::new(40, 3, 40, 20),
            ..ScreenLayout::default()
        });
        model.handle_mouse(MouseEvent {
            kind: MouseEventKind::ScrollDown,
            column: 50,
            row: 10,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::List));
        assert_eq!(model.navigator.thread().story_id(), None);

        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        model.handle_mouse(MouseEvent {
            kind: MouseEventKind::ScrollDown,
            column: 50,
            row: 10,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::Thread));
        assert_eq!(model.navigator.active_comment_id(), Some(2));
    }

    #[test]
    fn closing_a_story_drops_queued_thread_focus() {
        let mut model = model();
        press(&mut model, KeyCode::Enter);
        wait_for(&mut model, |m| !m.navigator.thread().is_loading());
        press(&mut model, KeyCode::Char('l'));
        assert_eq!(
            model.navigator.focus().pending(),
            Some(FocusTarget::ThreadContainer)
        );
        model.close_story();
        assert_eq!(model.navigator.focus().pending(), None);
        assert_eq!(model.navigator.focus_mode(), Some(FocusMode::List));
    }
}
