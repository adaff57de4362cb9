#[derive(Debug, Clone)]
pub struct BotConfig {
    pub rounds: u32,
    pub think_time_ms: u64,
    pub run_time_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            think_time_ms: 500,
            run_time_ms: 4_000,
        }
    }
}
