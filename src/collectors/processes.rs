use crate::format::{format_decimal, html_escape, round_to};
use crate::provider::{MetricsProvider, ProcessSample};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

pub const TOP_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedProcess {
    pub rank: usize,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl RankedProcess {
    fn table_row(&self) -> String {
        format!(
            "                        <tr>\n\
             \x20                           <td class=\"rank-cell\">#{}</td>\n\
             \x20                           <td>{}</td>\n\
             \x20                           <td>{}%</td>\n\
             \x20                           <td>{}%</td>\n\
             \x20                       </tr>\n",
            self.rank,
            html_escape(&self.name),
            format_decimal(self.cpu_percent),
            format_decimal(self.memory_percent),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessRanking {
    pub ranked: Vec<RankedProcess>,
}

impl ProcessRanking {
    pub fn total(&self) -> usize {
        self.ranked.len()
    }

    pub fn top(&self) -> &[RankedProcess] {
        &self.ranked[..self.ranked.len().min(TOP_COUNT)]
    }

    pub fn rest(&self) -> &[RankedProcess] {
        &self.ranked[self.ranked.len().min(TOP_COUNT)..]
    }

    pub fn top_rows_html(&self) -> String {
        self.top().iter().map(RankedProcess::table_row).collect()
    }

    pub fn rest_rows_html(&self) -> String {
        self.rest().iter().map(RankedProcess::table_row).collect()
    }
}

/// Prime, settle, measure, then rank. Processes that fail to read in
/// either pass are skipped.
pub fn rank_processes(provider: &mut dyn MetricsProvider, settle: Duration) -> ProcessRanking {
    info!("измерение загрузки CPU процессами, это займёт немного времени");
    let primed = provider.prime_processes();
    debug!(processes = primed, "первый проход по процессам завершён");

    if !settle.is_zero() {
        thread::sleep(settle);
    }

    let mut samples = Vec::new();
    let mut skipped = 0_usize;
    for reading in provider.measure_processes() {
        match reading {
            Ok(sample) => samples.push(sample),
            Err(err) => {
                skipped += 1;
                debug!(error = %err, "процесс пропущен");
            }
        }
    }
    debug!(
        measured = samples.len(),
        skipped, "второй проход по процессам завершён"
    );

    rank_samples(samples)
}

pub fn rank_samples(samples: Vec<ProcessSample>) -> ProcessRanking {
    let mut active: Vec<ProcessSample> = samples.into_iter().filter(|s| s.is_active()).collect();
    // sort_by is stable: equal scores keep enumeration order.
    active.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let ranked = active
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankedProcess {
            rank: i + 1,
            name: s.name,
            cpu_percent: round_to(s.cpu_percent, 1),
            memory_percent: round_to(s.memory_percent, 1),
        })
        .collect();
    ProcessRanking { ranked }
}
