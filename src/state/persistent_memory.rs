//! Persistent-memory text contract (spec.md §6, §8 invariant 6).
//!
//! Author-controlled markdown scratchpad with one constraint: no heading of
//! depth 1 or 2 may appear, only depth ≥ 3 (`###` and deeper). Violations are
//! dropped silently at the executor boundary rather than rejected, per spec.md §6.

/// True if `text` contains a `#`/`##` heading line (the only invariant
/// [`PersistentMemory`] enforces).
pub fn contains_invalid_heading(text: &str) -> bool {
    text.lines().any(|line| {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            return false;
        }
        let depth = trimmed.chars().take_while(|&c| c == '#').count();
        let rest_is_heading_text = trimmed[depth..].starts_with(' ') || trimmed.len() == depth;
        rest_is_heading_text && depth < 3
    })
}

/// Drops any `#`/`##` heading lines from `fragment`, leaving depth ≥ 3
/// headings and all other content untouched.
pub fn sanitize_fragment(fragment: &str) -> String {
    fragment
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            if !trimmed.starts_with('#') {
                return true;
            }
            let depth = trimmed.chars().take_while(|&c| c == '#').count();
            let rest_is_heading_text = trimmed[depth..].starts_with(' ') || trimmed.len() == depth;
            !(rest_is_heading_text && depth < 3)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A bounded plain-text scratchpad, private to one agent, preserved across
/// tasks/stages/steps (spec.md §3.1 "AgentState", GLOSSARY "Persistent memory").
///
/// Appends are never deduplicated (spec.md §8 scenario 5): appending the same
/// fragment twice yields two copies.
#[derive(Debug, Clone, Default)]
pub struct PersistentMemory {
    text: String,
    max_bytes: Option<usize>,
}

impl PersistentMemory {
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            text: String::new(),
            max_bytes,
        }
    }

    /// Appends a sanitized fragment, trimming the oldest content if the
    /// configured byte budget is exceeded.
    pub fn append(&mut self, fragment: &str) {
        let clean = sanitize_fragment(fragment);
        if clean.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&clean);
        if let Some(max) = self.max_bytes {
            while self.text.len() > max {
                match self.text.find('\n') {
                    Some(idx) => {
                        self.text.drain(0..=idx);
                    }
                    None => {
                        self.text.clear();
                        break;
                    }
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
