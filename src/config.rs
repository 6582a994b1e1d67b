use std::{fs, path::Path};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// maximum node executors in flight per run, defaults to 8
    pub max_in_flight_nodes: usize,
    /// per-node wall-clock bound in milliseconds, unbounded when absent
    pub node_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_worker_thread_number: 16,
            max_in_flight_nodes: 8,
            node_timeout_ms: None,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Self {
        let data = fs::read_to_string(path.as_ref()).unwrap_or_else(|_| panic!("failed to load config file {:?}", path.as_ref()));

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Self {
        toml::from_str::<Config>(toml_str).expect("failed to parse the toml str")
    }
}

#[cfg(test)]
mod test {
    use crate::Config;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        async_worker_thread_number = 10
        max_in_flight_nodes = 4
        node_timeout_ms = 5000
        "#;
        let config = Config::load_from_str(toml_str);
        assert_eq!(config.async_worker_thread_number, 10);
        assert_eq!(config.max_in_flight_nodes, 4);
        assert_eq!(config.node_timeout_ms, Some(5000));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("");
        assert_eq!(config.async_worker_thread_number, 16);
        assert_eq!(config.max_in_flight_nodes, 8);
        assert_eq!(config.node_timeout_ms, None);
    }
}
