//! Pearson correlation matrix of the columns of a dense data set, computed
//! block by block.
//!
//! The single round is irregular work: one task per block of `block`
//! columns computes the mean and the population standard deviation of its
//! columns and records them in a shared table.  The output is the upper
//! triangle of the correlation matrix, cut into `block x block` squares.
//! With `r = ceil(columns / block)` there are `r * (r + 1) / 2` squares and
//! fragment `f` is the square at block column `c` and block row
//! `f - c * (c + 1) / 2`, with `c` the largest integer such that
//! `c * (c + 1) / 2 <= f`.

use std::{
    ops::Range,
    sync::{Mutex, PoisonError},
    vec,
};
use tracing::debug;

use crate::{
    config::CorrelationConfig,
    error::{ConfigError, Error},
    gist::Gist,
    gla::Fragments,
    runtime::Runtime,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ColumnStats {
    mean: f64,
    sd: f64,
}

#[derive(Debug)]
pub struct Correlation {
    config: CorrelationConfig,
    rows: Vec<Vec<f64>>,
    columns: usize,

    // Filled concurrently by the tasks of round 0.
    shared: Mutex<Vec<ColumnStats>>,

    // Snapshot of `shared` taken after round 0.
    stats: Vec<ColumnStats>,
}

impl Correlation {
    /// Every row must have the same number of columns.
    pub fn new(config: CorrelationConfig, rows: Vec<Vec<f64>>) -> Result<Self, Error> {
        config.validate()?;
        let columns = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|row| row.len() != columns) {
            return Err(ConfigError::invalid(
                "rows",
                format!("a row of {} columns", row.len()),
                "rows of equal length",
            )
            .into());
        }

        Ok(Self {
            config,
            rows,
            columns,
            shared: Mutex::new(vec![ColumnStats::default(); columns]),
            stats: Vec::new(),
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    fn blocks_per_side(&self) -> usize {
        self.columns.div_ceil(self.config.block)
    }

    fn block_columns(&self, block: usize) -> Range<usize> {
        let first = block * self.config.block;
        first..(first + self.config.block).min(self.columns)
    }

    /// Block coordinates `(row, column)` of fragment `fragment`.
    fn block_of(fragment: usize) -> (usize, usize) {
        let mut column = (((1 + 8 * fragment) as f64).sqrt() as usize - 1) / 2;
        // Correct the floating point estimate.
        while column * (column + 1) / 2 > fragment {
            column -= 1;
        }
        while (column + 1) * (column + 2) / 2 <= fragment {
            column += 1;
        }
        (fragment - column * (column + 1) / 2, column)
    }

    fn column_stats(&self, column: usize) -> ColumnStats {
        let n = self.rows.len() as f64;
        let (sum, sum_of_squares) = self.rows.iter().fold((0.0, 0.0), |(s, q), row| {
            let x = row[column];
            (s + x, q + x * x)
        });
        let mean = sum / n;
        ColumnStats {
            mean,
            sd: (sum_of_squares / n - mean * mean).max(0.0).sqrt(),
        }
    }

    fn correlation_block(&self, rows: Range<usize>, columns: Range<usize>) -> Vec<(usize, usize, f64)> {
        let width = columns.len();
        let mut products = vec![0.0; rows.len() * width];
        for data in &self.rows {
            for (i, r) in rows.clone().enumerate() {
                let x = data[r];
                for (j, c) in columns.clone().enumerate() {
                    products[i * width + j] += x * data[c];
                }
            }
        }

        let n = self.rows.len() as f64;
        let mut cells = Vec::with_capacity(products.len());
        for (i, r) in rows.clone().enumerate() {
            for (j, c) in columns.clone().enumerate() {
                if r > c || (r == c && !self.config.diagonal) {
                    continue;
                }
                let (row, column) = (self.stats[r], self.stats[c]);
                let deviation = row.sd * column.sd;
                let value = if deviation == 0.0 {
                    0.0
                } else {
                    (products[i * width + j] / n - row.mean * column.mean) / deviation
                };
                cells.push((r, c, value));
            }
        }
        cells
    }
}

impl Gist for Correlation {
    /// A block of columns.
    type Task = Range<usize>;

    fn prepare_round(&mut self, _round: usize) -> Vec<Range<usize>> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        (0..self.blocks_per_side())
            .map(|block| self.block_columns(block))
            .collect()
    }

    fn do_step(&self, columns: Range<usize>) {
        let stats: Vec<ColumnStats> = columns.clone().map(|c| self.column_stats(c)).collect();
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared[columns].copy_from_slice(&stats);
    }

    fn should_iterate(&mut self, _round: usize) -> bool {
        self.stats = self
            .shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!("correlation: statistics of {} columns ready", self.columns);
        false
    }
}

impl Fragments for Correlation {
    /// `(row, column, correlation)` with `row <= column`.
    type Row = (usize, usize, f64);
    type Cursor<'a>
        = vec::IntoIter<(usize, usize, f64)>
    where
        Self: 'a;

    fn num_fragments(&mut self) -> usize {
        if self.rows.is_empty() {
            return 0;
        }
        let ratio = self.blocks_per_side();
        ratio * (ratio + 1) / 2
    }

    fn finalize(&self, fragment: usize) -> Self::Cursor<'_> {
        let (row, column) = Self::block_of(fragment);
        self.correlation_block(self.block_columns(row), self.block_columns(column))
            .into_iter()
    }
}

/// Computes the upper triangle of the correlation matrix of `rows`.
pub fn run(runtime: &Runtime, config: CorrelationConfig, rows: Vec<Vec<f64>>) -> Result<Vec<(usize, usize, f64)>, Error> {
    let mut correlation = Correlation::new(config, rows)?;
    runtime.run_gist(&mut correlation, 1)?;
    let fragments = runtime.collect_fragments(&mut correlation)?;
    Ok(fragments.into_iter().flatten().collect())
}
