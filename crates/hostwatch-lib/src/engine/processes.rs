//! Top-CPU process accumulation during a CPU breach

use std::collections::HashMap;

use crate::models::{ProcessCpu, ProcessLoad};

/// Default number of process-table rows registered per tick
pub const DEFAULT_TOP_PROCESS_LIMIT: usize = 3;

#[derive(Debug, Clone)]
struct ProcessTotals {
    name: String,
    cpu_sum: f64,
    observations: u32,
}

/// Collects CPU observations per process name across a breach episode
///
/// Only running totals are kept, so memory is bounded by the number of
/// distinct names however long CPU pressure lasts.
#[derive(Debug, Clone, Default)]
pub struct ProcessLoadAccumulator {
    /// Running CPU total and observation count per name, in first-seen order
    entries: Vec<ProcessTotals>,
    index: HashMap<String, usize>,
}

impl ProcessLoadAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the first `limit` rows of a process table snapshot
    pub fn register(&mut self, top: &[ProcessCpu], limit: usize) {
        for process in top.iter().take(limit) {
            match self.index.get(&process.name) {
                Some(&i) => {
                    let totals = &mut self.entries[i];
                    totals.cpu_sum += process.cpu_percent;
                    totals.observations += 1;
                }
                None => {
                    self.index.insert(process.name.clone(), self.entries.len());
                    self.entries.push(ProcessTotals {
                        name: process.name.clone(),
                        cpu_sum: process.cpu_percent,
                        observations: 1,
                    });
                }
            }
        }
    }

    /// Per-name averages, highest first; ties keep first-seen order
    pub fn summary(&self) -> Vec<ProcessLoad> {
        let mut loads: Vec<ProcessLoad> = self
            .entries
            .iter()
            .map(|totals| ProcessLoad {
                name: totals.name.clone(),
                average_cpu: totals.cpu_sum / f64::from(totals.observations),
            })
            .collect();

        loads.sort_by(|a, b| {
            b.average_cpu
                .partial_cmp(&a.average_cpu)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        loads
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
