use std::cell::RefCell;
use std::rc::Rc;

/// Sink for user-facing output.
pub trait Reporter {
    /// A normal output line.
    fn info(&self, line: &str);
    /// A failure line; renderers prefix it with `! `.
    fn error(&self, line: &str);
    /// Replaces the transient status line.
    fn status(&self, line: &str);
    fn clear_status(&self) {}
}

/// Collects output in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    lines: Rc<RefCell<Vec<String>>>,
    statuses: Rc<RefCell<Vec<String>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains recorded lines.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }

    /// Drains recorded lines joined with newlines, one trailing newline
    /// per line.
    pub fn take_text(&self) -> String {
        self.take()
            .into_iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.borrow().clone()
    }
}

impl Reporter for MemoryReporter {
    fn info(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }

    fn error(&self, line: &str) {
        self.lines.borrow_mut().push(format!("! {line}"));
    }

    fn status(&self, line: &str) {
        self.statuses.borrow_mut().push(line.to_string());
    }
}
