use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::comments::{CommentId, OrphanPolicy};
use crate::focus::{FocusContext, FocusCoordinator, FocusKey, FocusMode, Transition};
use crate::thread::ThreadView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Focus(FocusKey),
    EscapeToList,
    NextComment,
    PreviousComment,
    ToggleComment,
    CollapseComment,
    ExpandComment,
    ExpandAll,
}

/// Key binding table. Thread-mode arrows act on comments, so leaving the
/// thread sideways takes Ctrl+Left.
pub fn action_for(mode: FocusMode, key: &KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if key.code == KeyCode::Esc {
        return Some(Action::Focus(FocusKey::Cancel));
    }
    match mode {
        FocusMode::Thread => match key.code {
            KeyCode::Left if ctrl => Some(Action::EscapeToList),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::NextComment),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::PreviousComment),
            KeyCode::Char('c') | KeyCode::Enter => Some(Action::ToggleComment),
            KeyCode::Left => Some(Action::CollapseComment),
            KeyCode::Right => Some(Action::ExpandComment),
            KeyCode::Char('C') => Some(Action::ExpandAll),
            _ => None,
        },
        FocusMode::List => match key.code {
            KeyCode::Up if ctrl => Some(Action::Focus(FocusKey::TowardHeader)),
            KeyCode::Char('l') | KeyCode::Right => Some(Action::Focus(FocusKey::TowardThread)),
            KeyCode::Char('h') | KeyCode::Left => Some(Action::Focus(FocusKey::TowardSidebar)),
            _ => None,
        },
        FocusMode::Sidebar => match key.code {
            KeyCode::Char('l') | KeyCode::Right => Some(Action::Focus(FocusKey::TowardList)),
            _ => None,
        },
        FocusMode::Header => match key.code {
            KeyCode::Char('j') | KeyCode::Down => Some(Action::Focus(FocusKey::TowardList)),
            _ => None,
        },
    }
}

/// What the presentation layer has to know about the current key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputContext {
    pub text_input_active: bool,
    pub selected_story: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Not ours; the caller may use the key for something else.
    Ignored,
    /// Consumed, possibly without any visible effect.
    Handled,
    /// The active comment changed and should be scrolled into view.
    Reveal(CommentId),
    Focus(Transition),
}

/// Keyboard and pointer entry point for the thread reader. Owns the focus
/// coordinator and the thread state; nothing else mutates either.
#[derive(Debug, Clone)]
pub struct Navigator {
    focus: FocusCoordinator,
    thread: ThreadView,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(OrphanPolicy::Root, Duration::from_millis(30))
    }
}

impl Navigator {
    pub fn new(orphan_policy: OrphanPolicy, focus_delay: Duration) -> Self {
        Self {
            focus: FocusCoordinator::new(focus_delay),
            thread: ThreadView::new(orphan_policy),
        }
    }

    pub fn focus(&self) -> &FocusCoordinator {
        &self.focus
    }

    pub fn focus_mut(&mut self) -> &mut FocusCoordinator {
        &mut self.focus
    }

    pub fn focus_mode(&self) -> Option<FocusMode> {
        self.focus.mode()
    }

    /// Pointer-driven mode change. Thread mode needs an open thread, the
    /// same as moving there with the keyboard.
    pub fn set_focus_mode(&mut self, mode: FocusMode) -> bool {
        if mode == FocusMode::Thread && self.thread.story_id().is_none() {
            return false;
        }
        self.focus.set_mode(mode)
    }

    pub fn thread(&self) -> &ThreadView {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut ThreadView {
        &mut self.thread
    }

    pub fn active_comment_id(&self) -> Option<CommentId> {
        self.thread.active_comment_id()
    }

    pub fn handle_key(&mut self, key: KeyEvent, input: &InputContext, now: Instant) -> Response {
        if input.text_input_active {
            return Response::Ignored;
        }
        let Some(mode) = self.focus.mode() else {
            return Response::Ignored;
        };
        match action_for(mode, &key) {
            Some(action) => self.apply(action, input, now),
            None => Response::Ignored,
        }
    }

    pub fn apply(&mut self, action: Action, input: &InputContext, now: Instant) -> Response {
        if input.text_input_active {
            return Response::Ignored;
        }
        let ctx = FocusContext {
            text_input_active: false,
            thread_open: self.thread.story_id().is_some(),
            selected_story: input.selected_story,
        };

        if let Action::Focus(key) = action {
            return match self.focus.handle(key, &ctx, now) {
                Transition::Ignored => Response::Ignored,
                transition => Response::Focus(transition),
            };
        }

        if self.thread.is_loading() {
            return Response::Handled;
        }
        let active = self.thread.active_comment_id();
        match action {
            Action::EscapeToList => {
                Response::Focus(self.focus.handle(FocusKey::TowardList, &ctx, now))
            }
            Action::NextComment => reveal(self.thread.select_next()),
            Action::PreviousComment => reveal(self.thread.select_previous()),
            Action::ToggleComment => {
                if let Some(id) = active {
                    self.thread.toggle(id);
                }
                Response::Handled
            }
            Action::CollapseComment => {
                if let Some(id) = active {
                    self.thread.collapse(id);
                }
                Response::Handled
            }
            Action::ExpandComment => {
                if let Some(id) = active {
                    self.thread.expand(id);
                }
                Response::Handled
            }
            Action::ExpandAll => {
                self.thread.expand_all();
                Response::Handled
            }
            Action::Focus(_) => Response::Handled,
        }
    }

    /// Pointer selection: same end state as moving onto the comment with
    /// the keyboard.
    pub fn click_comment(&mut self, id: CommentId) -> Response {
        if self.thread.is_loading() || !self.thread.is_visible(id) {
            return Response::Ignored;
        }
        self.focus.set_mode(FocusMode::Thread);
        self.thread.select_comment(id);
        Response::Reveal(id)
    }

    /// Pointer toggle: same end state as selecting the comment and pressing
    /// the toggle key.
    pub fn click_toggle(&mut self, id: CommentId) -> Response {
        if self.click_comment(id) == Response::Ignored {
            return Response::Ignored;
        }
        self.thread.toggle(id);
        Response::Handled
    }
}

fn reveal(moved: Option<CommentId>) -> Response {
    match moved {
        Some(id) => Response::Reveal(id),
        None => Response::Handled,
    }
}
