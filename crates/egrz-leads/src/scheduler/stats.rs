use crate::regions::RegionLabel;
use std::fmt;
use std::ops::AddAssign;

/// What happened to the records of one region during a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RegionStats {
    /// The registry couldn't be fetched, all the other counters are zero then
    pub(crate) fetch_failed: bool,

    pub(crate) records_seen: usize,

    /// Records that don't need a contractor, never sent to anyone
    pub(crate) skipped_irrelevant: usize,

    /// Records every subscriber has already received
    pub(crate) already_delivered: usize,

    /// Records for which a notification was resolved and sent out
    pub(crate) processed: usize,

    /// Records that failed before any send was attempted
    pub(crate) errored: usize,

    pub(crate) sent: usize,
    pub(crate) send_failures: usize,
}

impl AddAssign<&RegionStats> for RegionStats {
    fn add_assign(&mut self, other: &RegionStats) {
        self.fetch_failed |= other.fetch_failed;
        self.records_seen += other.records_seen;
        self.skipped_irrelevant += other.skipped_irrelevant;
        self.already_delivered += other.already_delivered;
        self.processed += other.processed;
        self.errored += other.errored;
        self.sent += other.sent;
        self.send_failures += other.send_failures;
    }
}

impl fmt::Display for RegionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fetch_failed {
            return f.write_str("fetch failed");
        }
        let Self {
            fetch_failed: _,
            records_seen,
            skipped_irrelevant,
            already_delivered,
            processed,
            errored,
            sent,
            send_failures,
        } = self;

        write!(
            f,
            "seen {records_seen}, processed {processed}, irrelevant {skipped_irrelevant}, \
            already delivered {already_delivered}, errored {errored}, \
            sent {sent}, send failures {send_failures}"
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RunStats {
    pub(crate) regions: Vec<(RegionLabel, RegionStats)>,
}

impl RunStats {
    pub(crate) fn push(&mut self, region: RegionLabel, stats: RegionStats) {
        self.regions.push((region, stats));
    }

    #[cfg(test)]
    pub(crate) fn region(&self, region: &RegionLabel) -> Option<&RegionStats> {
        self.regions
            .iter()
            .find(|(label, _)| label == region)
            .map(|(_, stats)| stats)
    }

    /// Sum over all regions. `fetch_failed` is not meaningful here,
    /// see [`Self::failed_regions`].
    pub(crate) fn totals(&self) -> RegionStats {
        let mut totals = RegionStats::default();
        for (_, stats) in &self.regions {
            totals += stats;
        }
        totals.fetch_failed = false;
        totals
    }

    pub(crate) fn failed_regions(&self) -> usize {
        self.regions
            .iter()
            .filter(|(_, stats)| stats.fetch_failed)
            .count()
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.regions.is_empty() {
            return f.write_str("no subscribed regions");
        }
        for (region, stats) in &self.regions {
            writeln!(f, "{region}: {stats}")?;
        }
        write!(
            f,
            "total ({} regions, {} failed): {}",
            self.regions.len(),
            self.failed_regions(),
            self.totals()
        )
    }
}
