//! The collaborators a host editor supplies.

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{error, info, warn};

/// Editable text with change notifications and a cursor.
///
/// Offsets are counted in chars; lines and columns are 1-based.
pub trait TextBuffer: Send + Sync {
    fn text(&self) -> String;

    fn set_text(&self, text: &str);

    /// A receiver that is marked changed on every edit.
    fn subscribe(&self) -> watch::Receiver<u64>;

    fn cursor(&self) -> usize;

    fn line_column(&self, offset: usize) -> (usize, usize) {
        line_column(&self.text(), offset)
    }

    fn offset(&self, line: usize, column: usize) -> Option<usize> {
        char_offset(&self.text(), line, column)
    }
}

/// Fire-and-forget messages for the user.
pub trait NotificationSink: Send + Sync {
    fn show_success(&self, message: &str);
    fn show_warning(&self, message: &str);
    fn show_error(&self, message: &str);
}

/// The 1-based line and column of a char offset. Offsets past the end are
/// clamped to it.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for c in text.chars().take(offset) {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// The char offset of a 1-based line and column. The column just past the
/// end of a line is allowed.
pub fn char_offset(text: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 || column == 0 {
        return None;
    }
    let mut offset = 0;
    for (index, content) in text.split('\n').enumerate() {
        let length = content.chars().count();
        if index + 1 == line {
            return (column <= length + 1).then_some(offset + column - 1);
        }
        offset += length + 1;
    }
    None
}

#[derive(Debug, Default)]
struct Contents {
    text: String,
    cursor: usize,
}

/// A [`TextBuffer`] held in memory, for hosts without an editor widget.
#[derive(Debug)]
pub struct MemoryBuffer {
    contents: Mutex<Contents>,
    revision: watch::Sender<u64>,
}

impl MemoryBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            contents: Mutex::new(Contents {
                text: text.to_string(),
                cursor: 0,
            }),
            revision: watch::Sender::new(0),
        }
    }

    /// Move the cursor, clamped to the end of the text.
    pub fn set_cursor(&self, cursor: usize) {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        contents.cursor = cursor.min(contents.text.chars().count());
    }

    /// Insert text at the cursor and move the cursor past it.
    pub fn insert(&self, text: &str) {
        {
            let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
            let index = contents
                .text
                .char_indices()
                .nth(contents.cursor)
                .map(|(index, _)| index)
                .unwrap_or(contents.text.len());
            contents.text.insert_str(index, text);
            contents.cursor += text.chars().count();
        }
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new("")
    }
}

impl TextBuffer for MemoryBuffer {
    fn text(&self) -> String {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }

    fn set_text(&self, text: &str) {
        {
            let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
            contents.text = text.to_string();
            contents.cursor = contents.cursor.min(contents.text.chars().count());
        }
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn cursor(&self) -> usize {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cursor
    }
}

/// Sends notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn show_success(&self, message: &str) {
        info!("{}", message);
    }

    fn show_warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn show_error(&self, message: &str) {
        error!("{}", message);
    }
}
