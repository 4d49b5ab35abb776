//! Wire convention shared by the LLM prompts and the extractors.

/// Tokens of one version of the reply convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    /// Version number, bumped whenever a token changes
    pub version: u32,
    /// Separates prose from context-update lines
    pub update_sentinel: &'static str,
    /// Separates prose from the calendar JSON payload
    pub calendar_sentinel: &'static str,
    /// Optional label in front of the prose
    pub answer_label: &'static str,
    /// Comma-separated goals
    pub goals_label: &'static str,
    /// Comma-separated recent actions
    pub recent_label: &'static str,
    /// Comma-separated `key:value` pairs
    pub progress_label: &'static str,
}

impl Grammar {
    pub const V1: Grammar = Grammar {
        version: 1,
        update_sentinel: "|||UPDATE_DATA|||",
        calendar_sentinel: "|||CALENDAR_EVENT|||",
        answer_label: "Ответ:",
        goals_label: "Цели:",
        recent_label: "Недавние действия:",
        progress_label: "Прогресс:",
    };

    fn sentinels(&self) -> [&'static str; 2] {
        [self.update_sentinel, self.calendar_sentinel]
    }

    /// Byte offset of the earliest sentinel of any kind.
    fn first_sentinel(&self, text: &str) -> Option<usize> {
        self.sentinels()
            .iter()
            .filter_map(|sentinel| text.find(sentinel))
            .min()
    }

    /// Answer text of a reply.
    ///
    /// Everything before the first sentinel, trimmed and without the answer
    /// label. Without any sentinel the whole trimmed reply is returned as is.
    pub fn prose(&self, reply: &str) -> String {
        match self.first_sentinel(reply) {
            Some(pos) => self.strip_answer_label(&reply[..pos]),
            None => reply.trim().to_string(),
        }
    }

    /// Trim `text` and remove a leading answer label.
    pub fn strip_answer_label(&self, text: &str) -> String {
        let trimmed = text.trim();
        trimmed
            .strip_prefix(self.answer_label)
            .unwrap_or(trimmed)
            .trim()
            .to_string()
    }

    /// Structured segment introduced by `sentinel`.
    ///
    /// Runs from the first occurrence of `sentinel` up to the next sentinel of
    /// any kind, or the end of the reply. `None` when `sentinel` is absent.
    pub fn segment<'a>(&self, reply: &'a str, sentinel: &str) -> Option<&'a str> {
        let start = reply.find(sentinel)? + sentinel.len();
        let rest = &reply[start..];
        let end = self.first_sentinel(rest).unwrap_or(rest.len());
        Some(&rest[..end])
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::V1
    }
}
