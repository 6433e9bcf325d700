/// One-shot completion latch owned by a single action instance.
///
/// Moves from unset to set exactly once and is never reset; a new action
/// gets a new latch.
#[derive(Debug, Default)]
pub struct Latch {
    set: bool,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns `true` only for the call that performed the
    /// transition, so callers can hang their one-time side effects on it.
    pub fn set(&mut self) -> bool {
        if self.set {
            return false;
        }
        self.set = true;
        true
    }

    pub fn is_set(&self) -> bool {
        self.set
    }
}
