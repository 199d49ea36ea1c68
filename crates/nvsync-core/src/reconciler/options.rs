use serde_json::Map;

use super::Pass;
use crate::engine::Engine;
use crate::report::ReconcileError;
use crate::strategy::{strategy_for, ApplyStrategy};

impl<E: Engine + ?Sized> Pass<'_, E> {
    /// Apply changed viewer options. Passive entries are merged into the
    /// engine's options record in a single call; setter-backed entries each
    /// get their dedicated call.
    pub(super) fn apply_options(&mut self) {
        let entries = match self.config.options.entries() {
            Ok(entries) => entries,
            Err(e) => {
                self.record(ReconcileError::InvalidOption {
                    key: "*".to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut patch = Map::new();
        for (key, value) in entries {
            if self.live.options.get(&key) == Some(&value) {
                continue;
            }
            match strategy_for(&key) {
                ApplyStrategy::Passive => {
                    patch.insert(key, value);
                }
                ApplyStrategy::Setter(setter) => {
                    let call = match setter.decode(&value) {
                        Ok(call) => call,
                        Err(reason) => {
                            self.record(ReconcileError::InvalidOption { key, reason });
                            continue;
                        }
                    };
                    self.report.stats.setter_calls += 1;
                    match call.invoke(self.engine()) {
                        Ok(()) => {
                            log::debug!("option {} set via {:?}", key, setter);
                            self.live.options.insert(key, value);
                        }
                        Err(cause) => self.record(ReconcileError::EngineCall {
                            operation: format!("set {}", key),
                            cause,
                        }),
                    }
                }
            }
        }

        if patch.is_empty() {
            return;
        }
        self.report.stats.option_merges += 1;
        match self.engine().merge_options(&patch) {
            Ok(()) => {
                log::debug!("merged {} options", patch.len());
                self.live.options.extend(patch);
            }
            Err(cause) => self.record(ReconcileError::EngineCall {
                operation: "merge_options".to_string(),
                cause,
            }),
        }
    }
}
