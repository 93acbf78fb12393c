use tracing_subscriber::{EnvFilter, fmt};

/// Log sink handed to the lifecycle controller.
pub trait AddonLog: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
}

/// Forwards to `tracing` under the `docker_addon` target.
#[derive(Default, Clone, Copy)]
pub struct TracingLog;

impl AddonLog for TracingLog {
    fn debug(&self, msg: &str) {
        tracing::debug!(target: "docker_addon", "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!(target: "docker_addon", "{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(target: "docker_addon", "{msg}");
    }
}

pub fn init_tracing(debug: bool) {
    let default = if debug { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .without_time()
        .try_init();
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::AddonLog;

    #[derive(Default)]
    pub struct RecordingLog {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingLog {
        pub fn lines(&self, level: &str) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, m)| m.clone())
                .collect()
        }

        fn push(&self, level: &'static str, msg: &str) {
            self.lines.lock().unwrap().push((level, msg.to_string()));
        }
    }

    impl AddonLog for RecordingLog {
        fn debug(&self, msg: &str) {
            self.push("debug", msg);
        }

        fn info(&self, msg: &str) {
            self.push("info", msg);
        }

        fn warn(&self, msg: &str) {
            self.push("warn", msg);
        }
    }
}
