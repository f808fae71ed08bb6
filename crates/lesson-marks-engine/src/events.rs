//! Session-scoped notifications for the host.
//!
//! One [`EventBus`] belongs to one lesson session and is handed to whatever
//! needs to publish. Nothing here is global: two sessions never see each
//! other's events.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::models::{Note, NoteId};
use crate::restore::RestoreReport;

pub type SubscriptionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Short user-facing message, such as a failed save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LessonEvent {
    /// The note list changed; carries the full list in display order
    NotesChanged(Vec<Note>),
    Notice(Notice),
    /// A note's marker was scrolled to and flashed
    HighlightFocused { note_id: NoteId, marker: NodeId },
    /// A restoration pass finished
    Restored(RestoreReport),
}

type Listener = Rc<dyn Fn(&LessonEvent)>;

#[derive(Default)]
struct BusState {
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_id: Cell<SubscriptionId>,
    queue: RefCell<VecDeque<LessonEvent>>,
    dispatching: Cell<bool>,
}

/// Cheaply clonable handle; clones share listeners
#[derive(Clone, Default)]
pub struct EventBus {
    state: Rc<BusState>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.state.listeners.borrow().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&LessonEvent) + 'static) -> SubscriptionId {
        let id = self.state.next_id.get();
        self.state.next_id.set(id + 1);
        self.state
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.state
            .listeners
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }

    /// Deliver an event to every listener.
    ///
    /// Events published from inside a listener are queued and delivered once
    /// the current event has reached everyone, preserving publish order.
    pub fn publish(&self, event: LessonEvent) {
        self.state.queue.borrow_mut().push_back(event);
        if self.state.dispatching.replace(true) {
            return;
        }
        loop {
            let Some(event) = self.state.queue.borrow_mut().pop_front() else {
                break;
            };
            let listeners: Vec<Listener> = self
                .state
                .listeners
                .borrow()
                .iter()
                .map(|(_, listener)| Rc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&event);
            }
        }
        self.state.dispatching.set(false);
    }

    pub fn notify(&self, notice: Notice) {
        self.publish(LessonEvent::Notice(notice));
    }
}
