// src/work/snapshot.rs

use std::fmt;

/// Point-in-time copy of a work subtree, with aggregates already computed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkSnapshot {
    pub name: String,
    pub full_name: String,
    pub title: String,
    pub message: String,
    /// Aggregated over the subtree.
    pub progress: f64,
    /// Aggregated over the subtree.
    pub max_progress: f64,
    pub has_handle: bool,
    /// Own handle finished with an error.
    pub failed: bool,
    pub done: bool,
    pub children: Vec<WorkSnapshot>,
}

impl WorkSnapshot {
    /// Depth-first lookup by full name.
    pub fn find(&self, full_name: &str) -> Option<&WorkSnapshot> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_name))
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let marker = match (self.failed, self.done) {
            (true, _) => "fail",
            (false, true) => "done",
            (false, false) => "....",
        };
        let name = if self.name.is_empty() { "<root>" } else { &self.name };
        write!(
            f,
            "{:indent$}[{marker}] {name} {}/{}",
            "",
            self.progress,
            self.max_progress,
            indent = depth * 2
        )?;
        if !self.title.is_empty() {
            write!(f, " {}", self.title)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for WorkSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}
