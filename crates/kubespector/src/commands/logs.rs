//! Log retrieval command lines

use std::fmt;

use clap::ValueEnum;

/// Where the logs come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogType {
    /// systemd unit, via journalctl
    #[default]
    Service,
    /// Docker container
    Container,
    /// Kubernetes pod, via kubectl
    Pod,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogType::Service => "service",
            LogType::Container => "container",
            LogType::Pod => "pod",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub kind: LogType,
    pub since: Option<String>,
    /// Number of trailing lines; 0 means all
    pub tail: usize,
    pub extra_args: Vec<String>,
}

impl LogOptions {
    /// Command line fetching the logs of `element`
    #[must_use]
    pub fn command(&self, element: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        let since = self.since.as_deref().filter(|s| !s.is_empty());

        match self.kind {
            LogType::Service => {
                parts.push("journalctl".to_string());
                if self.tail > 0 {
                    parts.push(format!("--lines={}", self.tail));
                }
                if let Some(since) = since {
                    parts.push(format!("--since={since}"));
                }
                parts.extend(self.extra_args.iter().cloned());
                parts.push(format!("--unit={element}"));
            }
            LogType::Container => {
                parts.push("docker logs".to_string());
                if self.tail > 0 {
                    parts.push(format!("--tail {}", self.tail));
                }
                if let Some(since) = since {
                    parts.push(format!("--since {since}"));
                }
                parts.extend(self.extra_args.iter().cloned());
                parts.push(element.to_string());
            }
            LogType::Pod => {
                parts.push("kubectl logs".to_string());
                if self.tail > 0 {
                    parts.push(format!("--tail={}", self.tail));
                }
                if let Some(since) = since {
                    parts.push(format!("--since={since}"));
                }
                parts.extend(self.extra_args.iter().cloned());
                parts.push(element.to_string());
            }
        }

        parts.join(" ")
    }
}
