use std::time::{Duration, Instant};

/// The surface that currently owns keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    List,
    Thread,
    Sidebar,
    Header,
}

impl FocusMode {
    pub fn title(self) -> &'static str {
        match self {
            FocusMode::List => "Stories",
            FocusMode::Thread => "Discussion",
            FocusMode::Sidebar => "Topics",
            FocusMode::Header => "Feeds",
        }
    }
}

/// Direction keys the coordinator understands. Which physical key produces
/// which direction depends on the mode and lives in the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusKey {
    TowardThread,
    TowardList,
    TowardSidebar,
    TowardHeader,
    Cancel,
}

/// Where input focus lands after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    ThreadContainer,
    ListItem(usize),
    SidebarFirstControl,
    HeaderFirstControl,
}

/// Facts about the rest of the screen the transition table depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusContext {
    /// A text field has focus; every key belongs to it.
    pub text_input_active: bool,
    /// A story is selected and its thread pane exists.
    pub thread_open: bool,
    /// Index of the selected story within the list, if it is in the list.
    pub selected_story: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The key was not interpreted (inactive coordinator or text entry).
    Ignored,
    /// Interpreted, but there is nowhere to go.
    Unchanged,
    Moved {
        from: FocusMode,
        to: FocusMode,
        target: FocusTarget,
    },
}

impl Transition {
    pub fn moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFocus {
    target: FocusTarget,
    due: Instant,
}

/// Focus mode state machine plus the deferred input-focus transfer that
/// follows each transition.
///
/// The coordinator is inactive until [`FocusCoordinator::activate`] is called
/// once stories are available; it then starts in [`FocusMode::List`].
#[derive(Debug, Clone)]
pub struct FocusCoordinator {
    mode: Option<FocusMode>,
    pending: Option<PendingFocus>,
    delay: Duration,
}

impl Default for FocusCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(30))
    }
}

impl FocusCoordinator {
    pub fn new(delay: Duration) -> Self {
        Self {
            mode: None,
            pending: None,
            delay,
        }
    }

    pub fn mode(&self) -> Option<FocusMode> {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    pub fn activate(&mut self) {
        if self.mode.is_none() {
            self.mode = Some(FocusMode::List);
        }
    }

    /// Direct mode change for pointer interaction. Input focus already sits
    /// where the pointer clicked, so no transfer is scheduled. Does nothing
    /// until the coordinator is active.
    pub fn set_mode(&mut self, mode: FocusMode) -> bool {
        if self.mode.is_none() {
            return false;
        }
        let changed = self.mode != Some(mode);
        if changed {
            tracing::debug!(?mode, "focus mode set directly");
            self.pending = None;
        }
        self.mode = Some(mode);
        changed
    }

    pub fn handle(&mut self, key: FocusKey, ctx: &FocusContext, now: Instant) -> Transition {
        if ctx.text_input_active {
            return Transition::Ignored;
        }
        let Some(from) = self.mode else {
            return Transition::Ignored;
        };

        let list_item = FocusTarget::ListItem(ctx.selected_story.unwrap_or(0));
        let (to, target) = match (from, key) {
            (FocusMode::List, FocusKey::TowardThread) if ctx.thread_open => {
                (FocusMode::Thread, FocusTarget::ThreadContainer)
            }
            (FocusMode::List, FocusKey::TowardSidebar) => {
                (FocusMode::Sidebar, FocusTarget::SidebarFirstControl)
            }
            (FocusMode::List, FocusKey::TowardHeader) => {
                (FocusMode::Header, FocusTarget::HeaderFirstControl)
            }
            (FocusMode::Thread | FocusMode::Sidebar | FocusMode::Header, FocusKey::TowardList)
            | (FocusMode::Thread | FocusMode::Sidebar | FocusMode::Header, FocusKey::Cancel) => {
                (FocusMode::List, list_item)
            }
            _ => return Transition::Unchanged,
        };

        self.mode = Some(to);
        self.schedule(target, now);
        tracing::debug!(?from, ?to, destination = ?target, "focus moved");
        Transition::Moved { from, to, target }
    }

    /// Replaces any pending transfer.
    pub fn schedule(&mut self, target: FocusTarget, now: Instant) {
        self.pending = Some(PendingFocus {
            target,
            due: now + self.delay,
        });
    }

    pub fn pending(&self) -> Option<FocusTarget> {
        self.pending.map(|pending| pending.target)
    }

    pub fn cancel_pending(&mut self) -> Option<FocusTarget> {
        self.pending.take().map(|pending| pending.target)
    }

    /// Fires the pending transfer once it is due. `exists` reports whether
    /// the target has been rendered; a missing target is dropped.
    pub fn poll(
        &mut self,
        now: Instant,
        exists: impl FnOnce(FocusTarget) -> bool,
    ) -> Option<FocusTarget> {
        let pending = self.pending?;
        if now < pending.due {
            return None;
        }
        self.pending = None;
        if exists(pending.target) {
            Some(pending.target)
        } else {
            tracing::debug!(destination = ?pending.target, "focus target missing, transfer skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(mode: FocusMode) -> FocusCoordinator {
        let mut focus = FocusCoordinator::new(Duration::from_millis(30));
        focus.activate();
        focus.set_mode(mode);
        focus
    }

    fn open(selected: Option<usize>) -> FocusContext {
        FocusContext {
            text_input_active: false,
            thread_open: true,
            selected_story: selected,
        }
    }

    #[test]
    fn inactive_until_activated() {
        let mut focus = FocusCoordinator::default();
        assert_eq!(focus.mode(), None);
        let now = Instant::now();
        assert_eq!(
            focus.handle(FocusKey::TowardThread, &open(Some(0)), now),
            Transition::Ignored
        );
        focus.activate();
        assert_eq!(focus.mode(), Some(FocusMode::List));
    }

    #[test]
    fn list_to_thread_requires_open_thread() {
        let mut focus = active(FocusMode::List);
        let now = Instant::now();
        let ctx = FocusContext::default();
        assert_eq!(
            focus.handle(FocusKey::TowardThread, &ctx, now),
            Transition::Unchanged
        );
        assert_eq!(focus.mode(), Some(FocusMode::List));
        assert_eq!(focus.pending(), None);

        let moved = focus.handle(FocusKey::TowardThread, &open(Some(2)), now);
        assert_eq!(
            moved,
            Transition::Moved {
                from: FocusMode::List,
                to: FocusMode::Thread,
                target: FocusTarget::ThreadContainer,
            }
        );
        assert_eq!(focus.pending(), Some(FocusTarget::ThreadContainer));
    }

    #[test]
    fn thread_back_to_selected_story() {
        let now = Instant::now();
        for key in [FocusKey::TowardList, FocusKey::Cancel] {
            let mut focus = active(FocusMode::Thread);
            focus.handle(key, &open(Some(4)), now);
            assert_eq!(focus.mode(), Some(FocusMode::List));
            assert_eq!(focus.pending(), Some(FocusTarget::ListItem(4)));
        }
    }

    #[test]
    fn sidebar_round_trip_falls_back_to_first_item() {
        let now = Instant::now();
        let mut focus = active(FocusMode::List);
        focus.handle(FocusKey::TowardSidebar, &FocusContext::default(), now);
        assert_eq!(focus.mode(), Some(FocusMode::Sidebar));
        assert_eq!(focus.pending(), Some(FocusTarget::SidebarFirstControl));

        focus.handle(FocusKey::TowardList, &FocusContext::default(), now);
        assert_eq!(focus.mode(), Some(FocusMode::List));
        assert_eq!(focus.pending(), Some(FocusTarget::ListItem(0)));
    }

    #[test]
    fn header_reached_from_list_only() {
        let now = Instant::now();
        let mut focus = active(FocusMode::Thread);
        assert_eq!(
            focus.handle(FocusKey::TowardHeader, &open(None), now),
            Transition::Unchanged
        );
        let mut focus = active(FocusMode::List);
        focus.handle(FocusKey::TowardHeader, &open(None), now);
        assert_eq!(focus.mode(), Some(FocusMode::Header));
        focus.handle(FocusKey::Cancel, &open(Some(1)), now);
        assert_eq!(focus.mode(), Some(FocusMode::List));
    }

    #[test]
    fn cancel_in_list_is_noop() {
        let mut focus = active(FocusMode::List);
        assert_eq!(
            focus.handle(FocusKey::Cancel, &open(Some(1)), Instant::now()),
            Transition::Unchanged
        );
        assert_eq!(focus.pending(), None);
    }

    #[test]
    fn text_input_wins() {
        let mut focus = active(FocusMode::Sidebar);
        let ctx = FocusContext {
            text_input_active: true,
            ..open(Some(0))
        };
        assert_eq!(
            focus.handle(FocusKey::TowardList, &ctx, Instant::now()),
            Transition::Ignored
        );
        assert_eq!(focus.mode(), Some(FocusMode::Sidebar));
    }

    #[test]
    fn transfer_is_deferred_and_replaceable() {
        let start = Instant::now();
        let mut focus = active(FocusMode::List);
        focus.handle(FocusKey::TowardSidebar, &open(None), start);
        assert_eq!(focus.poll(start, |_| true), None);
        assert_eq!(focus.pending(), Some(FocusTarget::SidebarFirstControl));

        focus.handle(FocusKey::TowardList, &open(Some(3)), start);
        let later = start + Duration::from_millis(31);
        assert_eq!(focus.poll(later, |_| true), Some(FocusTarget::ListItem(3)));
        assert_eq!(focus.pending(), None);
    }

    #[test]
    fn missing_target_is_skipped() {
        let start = Instant::now();
        let mut focus = active(FocusMode::Thread);
        focus.handle(FocusKey::TowardList, &open(Some(9)), start);
        let later = start + Duration::from_secs(1);
        assert_eq!(focus.poll(later, |_| false), None);
        assert_eq!(focus.pending(), None);
    }

    #[test]
    fn set_mode_waits_for_activation() {
        let mut focus = FocusCoordinator::new(Duration::from_millis(30));
        assert!(!focus.set_mode(FocusMode::Sidebar));
        assert_eq!(focus.mode(), None);
        focus.activate();
        assert!(focus.set_mode(FocusMode::Sidebar));
        assert_eq!(focus.mode(), Some(FocusMode::Sidebar));
    }

    #[test]
    fn cancel_pending_drops_transfer() {
        let start = Instant::now();
        let mut focus = active(FocusMode::List);
        focus.handle(FocusKey::TowardSidebar, &open(None), start);
        assert_eq!(
            focus.cancel_pending(),
            Some(FocusTarget::SidebarFirstControl)
        );
        assert_eq!(focus.poll(start + Duration::from_secs(1), |_| true), None);
    }
}
