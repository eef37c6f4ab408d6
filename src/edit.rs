//! Inline editing of a single list entry
//!
//! An [`InlineEdit`] starts read-only. Focusing it starts an editing session
//! that buffers the user input, and pressing Enter (or leaving the field)
//! ends the session with a [`Commit`]. Only a commit with a changed value
//! needs to be sent to the server, see [`ListSync::commit`](crate::sync::ListSync::commit).
//!
//! ```rust
//! use listsync::edit::{Commit, InlineEdit, KeyPress, Pressed};
//! # use listsync::list::ListState;
//! # let mut list = ListState::new();
//! # let key = list.begin_create("b".to_string());
//!
//! let edit = InlineEdit::new(key, "b".to_string()).focus();
//! match edit.press(KeyPress::Enter) {
//!     Pressed::Done(_, commit) => assert_eq!(commit, Commit::Unchanged),
//!     Pressed::Editing(_) => unreachable!(),
//! }
//! ```
use crate::list::Key;

pub trait EditState {}

/// The value is displayed but cannot be typed into
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOnly;

/// The value is being edited
///
/// Holds the pending edit buffer next to the value the session started with.
#[derive(Debug, Clone, PartialEq)]
pub struct Editing<T> {
    original: T,
    buffer: T,
}

impl EditState for ReadOnly {}
impl<T> EditState for Editing<T> {}

/// Keys the editor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Enter,
    Escape,
    Other,
}

/// The outcome of an editing session
#[derive(Debug, Clone, PartialEq)]
pub enum Commit<T> {
    /// The value was not modified, nothing needs to be sent
    Unchanged,
    /// The entry needs to be updated with the new value
    Changed { key: Key, value: T },
}

impl<T> Commit<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Commit::Changed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct InlineEdit<T, S: EditState = ReadOnly> {
    key: Key,
    value: T,
    inner: S,
}

/// Result of pressing a key while editing
#[derive(Debug)]
pub enum Pressed<T> {
    /// The session is still open
    Editing(InlineEdit<T, Editing<T>>),
    /// The session ended
    Done(InlineEdit<T, ReadOnly>, Commit<T>),
}

impl<T, S: EditState> InlineEdit<T, S> {
    pub fn key(&self) -> Key {
        self.key
    }
}

impl<T> InlineEdit<T, ReadOnly> {
    pub fn new(key: Key, value: T) -> Self {
        InlineEdit {
            key,
            value,
            inner: ReadOnly,
        }
    }

    /// The displayed value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Start editing, the buffer starts with the displayed value
    pub fn focus(self) -> InlineEdit<T, Editing<T>>
    where
        T: Clone,
    {
        let InlineEdit { key, value, .. } = self;
        InlineEdit {
            key,
            value: value.clone(),
            inner: Editing {
                original: value.clone(),
                buffer: value,
            },
        }
    }
}

impl<T> InlineEdit<T, Editing<T>> {
    /// The current content of the edit buffer
    pub fn buffer(&self) -> &T {
        &self.inner.buffer
    }

    /// Replace the content of the edit buffer
    pub fn input(&mut self, value: T) {
        self.inner.buffer = value;
    }

    /// End the session keeping the buffer
    pub fn commit(self) -> (InlineEdit<T, ReadOnly>, Commit<T>)
    where
        T: Clone + PartialEq,
    {
        let InlineEdit { key, inner, .. } = self;
        let Editing { original, buffer } = inner;
        if buffer == original {
            return (InlineEdit::new(key, original), Commit::Unchanged);
        }

        (
            InlineEdit::new(key, buffer.clone()),
            Commit::Changed { key, value: buffer },
        )
    }

    /// Leaving the field commits, the same as pressing Enter
    pub fn blur(self) -> (InlineEdit<T, ReadOnly>, Commit<T>)
    where
        T: Clone + PartialEq,
    {
        self.commit()
    }

    /// End the session discarding the buffer
    pub fn cancel(self) -> InlineEdit<T, ReadOnly> {
        let InlineEdit { key, inner, .. } = self;
        InlineEdit::new(key, inner.original)
    }

    pub fn press(self, key: KeyPress) -> Pressed<T>
    where
        T: Clone + PartialEq,
    {
        match key {
            KeyPress::Enter => {
                let (edit, commit) = self.commit();
                Pressed::Done(edit, commit)
            }
            KeyPress::Escape => Pressed::Done(self.cancel(), Commit::Unchanged),
            KeyPress::Other => Pressed::Editing(self),
        }
    }
}
