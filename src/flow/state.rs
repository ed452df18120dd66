use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    NoKey,
    Enrolling,
    HasKey,
    Asserting,
}

impl FlowState {
    pub fn initial(has_record: bool) -> Self {
        if has_record { FlowState::HasKey } else { FlowState::NoKey }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, FlowState::Enrolling | FlowState::Asserting)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::NoKey => "no key",
            FlowState::Enrolling => "enrolling",
            FlowState::HasKey => "has key",
            FlowState::Asserting => "asserting",
        };
        f.write_str(s)
    }
}
