pub mod manager;
pub mod toggle;

pub use manager::{
    CooldownScope, CooldownState, DecisionPolicy, PolicyConfig, PolicyOutcome, SkipReason,
    MAX_COOLDOWN_SECS,
};
pub use toggle::{JsonFileToggle, MemoryToggle, ToggleConfig};
