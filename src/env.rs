//! Substitution environment
//!
//! A keyed map of raw values with an ordered list of transformation
//! passes. All passes must be idempotent and commutative; `Abort` is only
//! a hint and shouldn't be relied on. Lookup lazily replays the passes
//! added since the value was last materialised.

use std::collections::HashMap;

/// Raised by a pass to record a final result and suppress the remaining
/// passes for that key.
#[derive(Debug)]
pub struct Abort {
    pub result: String,
}

pub type Pass = Box<dyn Fn(&str, &str) -> Result<String, Abort>>;

#[derive(Debug)]
struct Slot {
    value: String,
    /// Index of the next pass to apply; `None` once aborted.
    next_pass: Option<usize>,
}

#[derive(Default)]
pub struct Environment {
    passes: Vec<Pass>,
    args: HashMap<String, Slot>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the process environment, so `{{KEY}}` tokens resolve
    /// through ordinary environment variables.
    pub fn from_os() -> Self {
        let mut env = Self::new();
        for (key, value) in std::env::vars() {
            env.set(&key, &value);
        }
        env
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.args.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                next_pass: Some(0),
            },
        );
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    /// Apply every pass to an out-of-band value.
    pub fn run(&self, key: &str, value: &str) -> String {
        let mut value = value.to_string();
        for pass in &self.passes {
            match pass(key, &value) {
                Ok(next) => value = next,
                Err(abort) => return abort.result,
            }
        }
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The materialised value for `key`, replaying any passes added since
    /// the last access.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let slot = self.args.get_mut(key)?;
        if let Some(start) = slot.next_pass {
            let mut value = slot.value.clone();
            let mut aborted = false;
            for pass in &self.passes[start..] {
                match pass(key, &value) {
                    Ok(next) => value = next,
                    Err(abort) => {
                        value = abort.result;
                        aborted = true;
                        break;
                    }
                }
            }
            slot.value = value;
            slot.next_pass = if aborted { None } else { Some(self.passes.len()) };
        }
        Some(slot.value.clone())
    }

    /// Every key with its materialised value.
    pub fn items(&mut self) -> Vec<(String, String)> {
        let keys: Vec<String> = self.args.keys().cloned().collect();
        keys.into_iter()
            .map(|key| {
                let value = self.get(&key).unwrap_or_default();
                (key, value)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "test/env.rs"]
mod tests;
