#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    pub max_lobbies: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0"),
            port: goatshell::DEFAULT_PORT,
            max_lobbies: 256,
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
