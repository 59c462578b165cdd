//! Consecutive-call loop detection with cooldowns.
//!
//! Every call is hashed over (tool, arguments) using a canonical JSON
//! encoding with recursively sorted keys, so equal argument maps produce
//! equal hashes regardless of iteration order. When more than
//! `max_consecutive_calls` identical calls land inside the time window, a
//! cooldown is installed for that hash; expired cooldowns are purged lazily.
//!
//! Lock order: the record queue is locked before the cooldown map.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Tunables, all overridable from the environment.
#[derive(Debug, Clone)]
pub struct LoopDetectionConfig {
    pub enabled: bool,
    pub max_consecutive_calls: usize,
    pub time_window: Duration,
    pub cooldown: Duration,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_consecutive_calls: 3,
            time_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl LoopDetectionConfig {
    /// Read tunables from `LOOP_DETECTION_*` environment variables, falling
    /// back to the defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("LOOP_DETECTION_ENABLED", defaults.enabled),
            max_consecutive_calls: env_usize(
                "LOOP_DETECTION_MAX_CONSECUTIVE",
                defaults.max_consecutive_calls,
            ),
            time_window: Duration::from_secs(env_u64(
                "LOOP_DETECTION_TIME_WINDOW",
                defaults.time_window.as_secs(),
            )),
            cooldown: Duration::from_secs(env_u64(
                "LOOP_DETECTION_COOLDOWN",
                defaults.cooldown.as_secs(),
            )),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
struct CallRecord {
    timestamp: Instant,
    hash: String,
}

/// Result of a loop check.
#[derive(Debug, Clone, Default)]
pub struct LoopDetectionResult {
    pub is_loop: bool,
    pub consecutive_calls: usize,
    pub max_allowed: usize,
    pub cooldown_until: Option<Instant>,
    pub message: String,
}

/// Per-instance loop detector state.
pub struct LoopDetector {
    config: LoopDetectionConfig,
    calls: Mutex<VecDeque<CallRecord>>,
    cooldowns: Mutex<HashMap<String, Instant>>,
}

impl LoopDetector {
    #[must_use]
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(VecDeque::new()),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether this call would continue a loop.
    ///
    /// A blocked call is not appended to the window; a cancelled or failed
    /// call that passed the check still counts as a call.
    pub fn check(&self, tool: &str, args: &Map<String, Value>) -> LoopDetectionResult {
        if !self.config.enabled {
            return LoopDetectionResult::default();
        }

        let now = Instant::now();
        let hash = canonical_call_hash(tool, args);

        let mut calls = self.calls.lock();

        {
            let mut cooldowns = self.cooldowns.lock();
            if let Some(&end) = cooldowns.get(&hash) {
                if now < end {
                    let remaining = end.saturating_duration_since(now).as_secs().max(1);
                    return LoopDetectionResult {
                        is_loop: true,
                        max_allowed: self.config.max_consecutive_calls,
                        cooldown_until: Some(end),
                        message: format!(
                            "Tool call is in cooldown for another {remaining}s to prevent loops"
                        ),
                        ..LoopDetectionResult::default()
                    };
                }
                cooldowns.remove(&hash);
            }
        }

        // Drop records that fell out of the time window.
        while calls
            .front()
            .is_some_and(|c| now.duration_since(c.timestamp) > self.config.time_window)
        {
            calls.pop_front();
        }

        // The current call counts as one.
        let mut consecutive = 1;
        for record in calls.iter().rev() {
            if record.hash == hash {
                consecutive += 1;
            } else {
                break;
            }
        }

        if consecutive > self.config.max_consecutive_calls {
            let end = now + self.config.cooldown;
            self.cooldowns.lock().insert(hash.clone(), end);

            tracing::debug!(
                tool,
                consecutive,
                max = self.config.max_consecutive_calls,
                "loop detected, cooldown installed"
            );

            return LoopDetectionResult {
                is_loop: true,
                consecutive_calls: consecutive,
                max_allowed: self.config.max_consecutive_calls,
                cooldown_until: Some(end),
                message: format!(
                    "Loop detected: {tool} called {consecutive} times consecutively (max: {}). \
                     Cooldown applied for {}s",
                    self.config.max_consecutive_calls,
                    self.config.cooldown.as_secs()
                ),
            };
        }

        calls.push_back(CallRecord {
            timestamp: now,
            hash,
        });

        LoopDetectionResult {
            is_loop: false,
            consecutive_calls: consecutive,
            max_allowed: self.config.max_consecutive_calls,
            cooldown_until: None,
            message: String::new(),
        }
    }

    /// Remove all cooldowns and history (manual intervention or tests).
    pub fn clear(&self) {
        self.calls.lock().clear();
        self.cooldowns.lock().clear();
    }

    /// Counters for monitoring.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        let calls = self.calls.lock().len();
        let cooldowns = self.cooldowns.lock().len();
        (calls, cooldowns)
    }
}

/// Stable, order-independent hash over (tool, arguments).
#[must_use]
pub fn canonical_call_hash(tool: &str, args: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    canonical.push_str("{\"args\":");
    write_canonical(&Value::Object(args.clone()), &mut canonical);
    canonical.push_str(",\"tool\":");
    write_canonical(&Value::String(tool.to_string()), &mut canonical);
    canonical.push('}');

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Serialize a JSON value with object keys recursively sorted.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
