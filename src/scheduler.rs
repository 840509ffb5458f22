//! Debounce bookkeeping for UI-triggered suggestion requests.
//!
//! Every trigger issues a [`DebounceToken`]. Only the token matching the
//! latest issue may act when its timer fires; stale timers must not fetch,
//! mutate state or inject anything. An in-flight fetch is never aborted, its
//! result is simply dropped once the token is stale.

/// Proof of which trigger scheduled a deferred action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceToken {
    generation: u64,
}

impl DebounceToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Why a fired timer did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Superseded,
    EmptyInput,
    AlreadyInjected,
    Trivial,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Superseded => "superseded",
            SkipReason::EmptyInput => "empty input",
            SkipReason::AlreadyInjected => "already injected",
            SkipReason::Trivial => "trivial input",
        }
    }
}

#[derive(Debug, Default)]
pub struct SchedulerState {
    generation: u64,
    pending_input: String,
    last_injected: Option<String>,
}

impl SchedulerState {
    /// Record the latest input and invalidate every earlier token
    pub fn schedule(&mut self, text: &str) -> DebounceToken {
        self.pending_input = text.to_string();
        self.generation += 1;
        DebounceToken {
            generation: self.generation,
        }
    }

    pub fn is_current(&self, token: DebounceToken) -> bool {
        token.generation == self.generation
    }

    /// Decide whether a fired timer may fetch, returning the input to fetch for
    pub fn claim(&self, token: DebounceToken, skip_trivial: bool) -> Result<String, SkipReason> {
        if !self.is_current(token) {
            return Err(SkipReason::Superseded);
        }
        let text = self.pending_input.trim();
        if text.is_empty() {
            return Err(SkipReason::EmptyInput);
        }
        if self.last_injected.as_deref().map(str::trim) == Some(text) {
            return Err(SkipReason::AlreadyInjected);
        }
        if skip_trivial && is_trivial_prompt(text) {
            return Err(SkipReason::Trivial);
        }
        Ok(text.to_string())
    }

    pub fn mark_injected(&mut self, rendered: &str) {
        self.last_injected = Some(rendered.to_string());
    }

    pub fn last_injected(&self) -> Option<&str> {
        self.last_injected.as_deref()
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }
}

/// Replies that only acknowledge the assistant
const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "k", "yes", "y", "yep", "sure", "no", "n", "nope", "thanks", "thank you",
    "thx", "ty", "got it", "done", "next", "go", "go on", "continue", "proceed", "stop",
];

const TASK_NOTIFICATION_TAG: &str = "<task-notification>";

/// Bare acknowledgements and task notifications carry nothing to suggest for
pub fn is_trivial_prompt(prompt: &str) -> bool {
    if prompt.contains(TASK_NOTIFICATION_TAG) {
        return true;
    }
    let normalized = prompt
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ','))
        .to_lowercase();
    ACKNOWLEDGEMENTS.contains(&normalized.as_str())
}
