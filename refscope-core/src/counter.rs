//! Statistical aggregation over the corpus.
//!
//! An [`Aggregator`] counts, for every observed item, how many corpus
//! entries mention it: overall, split by consent (CMP seen or not) and split
//! by popularity-rank bucket. Calling [`Aggregator::finalize`] turns it into a
//! read-only [`FinalizedAggregator`] that renders top-N tables.

use crate::error::ReportError;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Fixed, contiguous rank intervals: `[0, w)`, `[w, 2w)`, ... for `count` buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankBuckets {
    width: usize,
    count: usize,
}

impl Default for RankBuckets {
    fn default() -> Self {
        Self {
            width: 12_000,
            count: 5,
        }
    }
}

impl RankBuckets {
    pub fn new(width: usize, count: usize) -> Self {
        Self {
            width: width.max(1),
            count,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Zero-based ranks; ranks beyond the last bucket fall outside all of them.
    pub fn index_of(&self, rank: usize) -> Option<usize> {
        let index = rank / self.width;
        (index < self.count).then_some(index)
    }

    /// Human-readable one-based label, e.g. `1-12000`.
    pub fn label(&self, index: usize) -> String {
        format!("{}-{}", index * self.width + 1, (index + 1) * self.width)
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.count).map(|i| self.label(i)).collect()
    }
}

/// Whether a consent management platform was seen on the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consent {
    Cmp,
    NoCmp,
}

impl Consent {
    pub fn of(cmp: Option<&str>) -> Self {
        match cmp {
            Some(label) if !label.is_empty() => Consent::Cmp,
            _ => Consent::NoCmp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Consent::Cmp => "cmp",
            Consent::NoCmp => "no-cmp",
        }
    }

    fn index(&self) -> usize {
        match self {
            Consent::Cmp => 0,
            Consent::NoCmp => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Accumulating,
}

type Tally = HashMap<String, u64>;

#[derive(Debug, Clone)]
pub struct Aggregator {
    name: String,
    buckets: RankBuckets,
    total: Tally,
    consent: [Tally; 2],
    rank: Vec<Tally>,
    total_entries: u64,
    consent_entries: [u64; 2],
    rank_entries: Vec<u64>,
}

impl Aggregator {
    pub fn new(name: &str) -> Self {
        Self::with_buckets(name, RankBuckets::default())
    }

    pub fn with_buckets(name: &str, buckets: RankBuckets) -> Self {
        Self {
            name: name.to_string(),
            buckets,
            total: Tally::new(),
            consent: [Tally::new(), Tally::new()],
            rank: vec![Tally::new(); buckets.len()],
            total_entries: 0,
            consent_entries: [0, 0],
            rank_entries: vec![0; buckets.len()],
        }
    }

    /// Count one corpus entry.
    ///
    /// With no items and `is_total_counter == false` this is a no-op: the
    /// entry had no opportunity to be observed. Total counters pass `true`
    /// so that every entry lands in the denominators. Duplicate items within
    /// one call are counted once. Unlisted entries (`rank == None`) count
    /// towards the total and consent tables but no rank bucket.
    pub fn record_observation<I, S>(
        &mut self,
        rank: Option<usize>,
        cmp: Option<&str>,
        items: I,
        is_total_counter: bool,
    ) where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: BTreeSet<String> = items
            .into_iter()
            .map(|item| item.as_ref().to_string())
            .collect();
        if items.is_empty() && !is_total_counter {
            return;
        }

        let consent = Consent::of(cmp).index();
        let bucket = rank.and_then(|r| self.buckets.index_of(r));

        self.total_entries += 1;
        self.consent_entries[consent] += 1;
        if let Some(b) = bucket {
            self.rank_entries[b] += 1;
        }

        for item in items {
            *self.consent[consent].entry(item.clone()).or_default() += 1;
            if let Some(b) = bucket {
                *self.rank[b].entry(item.clone()).or_default() += 1;
            }
            *self.total.entry(item).or_default() += 1;
        }
    }

    /// Fold a partial aggregator (e.g. from one worker) into this one. Both
    /// must use the same bucket layout; extra buckets on `other` are ignored.
    pub fn merge(&mut self, other: &Aggregator) {
        fn add(into: &mut Tally, from: &Tally) {
            for (item, count) in from {
                *into.entry(item.clone()).or_default() += count;
            }
        }

        add(&mut self.total, &other.total);
        for (mine, theirs) in self.consent.iter_mut().zip(&other.consent) {
            add(mine, theirs);
        }
        for (mine, theirs) in self.rank.iter_mut().zip(&other.rank) {
            add(mine, theirs);
        }
        self.total_entries += other.total_entries;
        for (mine, theirs) in self.consent_entries.iter_mut().zip(other.consent_entries) {
            *mine += theirs;
        }
        for (mine, theirs) in self.rank_entries.iter_mut().zip(&other.rank_entries) {
            *mine += theirs;
        }
    }

    pub fn state(&self) -> AggregatorState {
        if self.total_entries == 0 {
            AggregatorState::Idle
        } else {
            AggregatorState::Accumulating
        }
    }

    pub fn finalize(self) -> FinalizedAggregator {
        FinalizedAggregator { inner: self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buckets(&self) -> RankBuckets {
        self.buckets
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }

    pub fn consent_entries(&self, consent: Consent) -> u64 {
        self.consent_entries[consent.index()]
    }

    pub fn bucket_entries(&self, bucket: usize) -> u64 {
        self.rank_entries.get(bucket).copied().unwrap_or(0)
    }

    pub fn count(&self, item: &str) -> u64 {
        self.total.get(item).copied().unwrap_or(0)
    }

    pub fn consent_count(&self, consent: Consent, item: &str) -> u64 {
        self.consent[consent.index()].get(item).copied().unwrap_or(0)
    }

    pub fn bucket_count(&self, bucket: usize, item: &str) -> u64 {
        self.rank
            .get(bucket)
            .and_then(|tally| tally.get(item))
            .copied()
            .unwrap_or(0)
    }
}

/// Which denominator a table is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableScope {
    Total,
    Consent,
    Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableEntry {
    pub item: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub scope: TableScope,
    pub bucket: String,
    pub denominator: u64,
    pub entries: Vec<TableEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub name: String,
    pub total_entries: u64,
    pub tables: Vec<Table>,
}

/// Percentage of `count` over `denominator`, refusing to divide by zero.
pub fn percentage(count: u64, denominator: u64, table: &str, bucket: &str) -> Result<f64, ReportError> {
    if denominator == 0 {
        return Err(ReportError::ZeroDenominator {
            table: table.to_string(),
            bucket: bucket.to_string(),
        });
    }
    Ok(count as f64 / denominator as f64 * 100.0)
}

/// Highest counts first; equal counts ordered by item name.
fn top_n(tally: &Tally, n: usize) -> Vec<(&str, u64)> {
    let mut ranked: Vec<(&str, u64)> = tally.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

/// Read-only view of an aggregator once accumulation is over.
#[derive(Debug, Clone)]
pub struct FinalizedAggregator {
    inner: Aggregator,
}

impl FinalizedAggregator {
    pub fn counts(&self) -> &Aggregator {
        &self.inner
    }

    /// Render the total, consent and rank tables, keeping `top` entries each.
    ///
    /// An aggregator that never saw an entry has nothing to be a percentage
    /// of, so its total table yields [`ReportError::ZeroDenominator`]. Empty
    /// consent or rank buckets are rendered as empty tables.
    pub fn report(&self, top: usize) -> Result<AggregateReport, ReportError> {
        let agg = &self.inner;
        let mut tables = Vec::with_capacity(3 + agg.rank.len());

        if agg.state() == AggregatorState::Idle {
            return Err(ReportError::ZeroDenominator {
                table: agg.name.clone(),
                bucket: "total".to_string(),
            });
        }
        tables.push(self.table(TableScope::Total, "total", &agg.total, agg.total_entries, top)?);

        for consent in [Consent::Cmp, Consent::NoCmp] {
            tables.push(self.table(
                TableScope::Consent,
                consent.as_str(),
                &agg.consent[consent.index()],
                agg.consent_entries[consent.index()],
                top,
            )?);
        }

        for (index, tally) in agg.rank.iter().enumerate() {
            tables.push(self.table(
                TableScope::Rank,
                &agg.buckets.label(index),
                tally,
                agg.rank_entries[index],
                top,
            )?);
        }

        Ok(AggregateReport {
            name: agg.name.clone(),
            total_entries: agg.total_entries,
            tables,
        })
    }

    fn table(
        &self,
        scope: TableScope,
        bucket: &str,
        tally: &Tally,
        denominator: u64,
        top: usize,
    ) -> Result<Table, ReportError> {
        let entries = top_n(tally, top)
            .into_iter()
            .map(|(item, count)| {
                Ok(TableEntry {
                    item: item.to_string(),
                    count,
                    percentage: percentage(count, denominator, &self.inner.name, bucket)?,
                })
            })
            .collect::<Result<Vec<_>, ReportError>>()?;

        Ok(Table {
            scope,
            bucket: bucket.to_string(),
            denominator,
            entries,
        })
    }
}
