//! Address-keyed deduplication of device records.
//!
//! An [`Aggregator`] lives for one scan window (or one parsed result set).
//! Sightings are merged by address keeping the strongest signal and the first
//! non-empty name; at the end of the window the records are drained in
//! signal order.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::types::{DeviceRecord, MacAddress};

/// Initial backing capacity; the store doubles when full.
pub const DEFAULT_INITIAL_CAPACITY: usize = 10;

/// What [`Aggregator::add_or_update`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting of this address; stored as a new record.
    Inserted,
    /// Stronger sighting of a known address; signal (and possibly name) updated.
    Merged,
    /// Sighting was not stronger than the stored one; nothing changed.
    Ignored,
    /// New address could not be stored (ceiling reached or allocation failed).
    Dropped,
}

/// Growable, address-keyed set of device records.
#[derive(Debug, Clone)]
pub struct Aggregator {
    records: Vec<DeviceRecord>,
    index: HashMap<MacAddress, usize>,
    ceiling: Option<usize>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Create an aggregator with the default initial capacity and no ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// Create an aggregator with a specific initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            ceiling: None,
        }
    }

    /// Cap the number of distinct devices; further new addresses are dropped.
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Option<usize>) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Merge one record into the set.
    pub fn add_or_update(&mut self, record: DeviceRecord) -> Outcome {
        if let Some(&slot) = self.index.get(&record.address) {
            return Self::merge(&mut self.records[slot], record);
        }

        if self.ceiling.is_some_and(|max| self.records.len() >= max) {
            warn!(
                address = %record.address,
                count = self.records.len(),
                "Scan results buffer full, ignoring device"
            );
            return Outcome::Dropped;
        }

        if let Err(e) = self.grow_if_full() {
            warn!(
                address = %record.address,
                count = self.records.len(),
                error = %e,
                "Failed to resize device array, ignoring device"
            );
            return Outcome::Dropped;
        }

        trace!(address = %record.address, rssi = record.signal_strength, "new device");
        self.index.insert(record.address, self.records.len());
        self.records.push(record);
        Outcome::Inserted
    }

    fn merge(stored: &mut DeviceRecord, incoming: DeviceRecord) -> Outcome {
        if incoming.signal_strength <= stored.signal_strength {
            return Outcome::Ignored;
        }

        stored.signal_strength = incoming.signal_strength;
        if !stored.has_name() && incoming.has_name() {
            stored.name = incoming.name;
        }
        Outcome::Merged
    }

    fn grow_if_full(&mut self) -> Result<(), std::collections::TryReserveError> {
        if self.records.len() < self.records.capacity() {
            return Ok(());
        }
        let additional = self.records.capacity().max(1);
        self.records.try_reserve_exact(additional)?;
        self.index.try_reserve(additional)
    }

    /// Number of distinct devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no device has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up the stored record for an address.
    #[must_use]
    pub fn get(&self, address: &MacAddress) -> Option<&DeviceRecord> {
        self.index.get(address).map(|&slot| &self.records[slot])
    }

    /// Iterate over records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    /// Consume the set, returning records strongest first.
    ///
    /// The sort is stable: equal signals keep insertion order.
    #[must_use]
    pub fn drain_sorted(self) -> Vec<DeviceRecord> {
        let mut records = self.records;
        records.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> MacAddress {
        MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn record(last: u8, rssi: i32, name: Option<&str>) -> DeviceRecord {
        DeviceRecord::new(addr(last), rssi, name.map(str::to_owned))
    }

    #[test]
    fn test_insert_then_ignore_weaker() {
        let mut agg = Aggregator::new();
        assert_eq!(agg.add_or_update(record(1, -60, None)), Outcome::Inserted);
        assert_eq!(agg.add_or_update(record(1, -70, Some("Late"))), Outcome::Ignored);
        assert_eq!(agg.add_or_update(record(1, -60, Some("Same"))), Outcome::Ignored);

        let stored = agg.get(&addr(1)).unwrap();
        assert_eq!(stored.signal_strength, -60);
        assert_eq!(stored.name, None);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_non_increasing_sequence_keeps_first() {
        let mut agg = Aggregator::new();
        for rssi in [-40, -40, -55, -70, -90] {
            agg.add_or_update(record(7, rssi, None));
        }
        assert_eq!(agg.get(&addr(7)).unwrap().signal_strength, -40);
    }

    #[test]
    fn test_stored_signal_is_maximum_seen() {
        let mut agg = Aggregator::new();
        let values = [-88, -71, -93, -65, -80, -66];
        for rssi in values {
            agg.add_or_update(record(3, rssi, None));
        }
        assert_eq!(
            agg.get(&addr(3)).unwrap().signal_strength,
            *values.iter().max().unwrap()
        );
    }

    #[test]
    fn test_name_adopted_from_stronger_sighting() {
        let mut agg = Aggregator::new();
        agg.add_or_update(record(1, -80, Some("")));
        assert_eq!(agg.add_or_update(record(1, -70, Some("Sensor"))), Outcome::Merged);
        assert_eq!(agg.get(&addr(1)).unwrap().name.as_deref(), Some("Sensor"));
    }

    #[test]
    fn test_name_kept_when_weaker_sighting_is_unnamed() {
        let mut agg = Aggregator::new();
        agg.add_or_update(record(1, -70, Some("Sensor")));
        agg.add_or_update(record(1, -80, Some("")));
        assert_eq!(agg.get(&addr(1)).unwrap().name.as_deref(), Some("Sensor"));
    }

    #[test]
    fn test_first_non_empty_name_wins() {
        let mut agg = Aggregator::new();
        agg.add_or_update(record(1, -80, Some("First")));
        assert_eq!(agg.add_or_update(record(1, -50, Some("Second"))), Outcome::Merged);
        let stored = agg.get(&addr(1)).unwrap();
        assert_eq!(stored.name.as_deref(), Some("First"));
        assert_eq!(stored.signal_strength, -50);
    }

    #[test]
    fn test_absent_name_filled_by_stronger_named_sighting() {
        let mut agg = Aggregator::new();
        agg.add_or_update(record(1, -82, None));
        agg.add_or_update(record(1, -65, Some("Tag1")));
        assert_eq!(agg.get(&addr(1)).unwrap().name.as_deref(), Some("Tag1"));
    }

    #[test]
    fn test_drain_sorted_strongest_first() {
        let mut agg = Aggregator::new();
        agg.add_or_update(record(1, -90, None));
        agg.add_or_update(record(2, -40, None));
        agg.add_or_update(record(3, -70, None));

        let rssi: Vec<i32> = agg.drain_sorted().iter().map(|r| r.signal_strength).collect();
        assert_eq!(rssi, vec![-40, -70, -90]);
    }

    #[test]
    fn test_drain_sorted_is_stable_for_ties() {
        let mut agg = Aggregator::new();
        for last in [5, 1, 9, 3] {
            agg.add_or_update(record(last, -60, None));
        }
        let order: Vec<u8> = agg.drain_sorted().iter().map(|r| r.address.0[5]).collect();
        assert_eq!(order, vec![5, 1, 9, 3]);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut agg = Aggregator::with_capacity(2);
        for last in 0..50 {
            assert_eq!(agg.add_or_update(record(last, -50, None)), Outcome::Inserted);
        }
        assert_eq!(agg.len(), 50);
        assert_eq!(agg.get(&addr(0)).unwrap().signal_strength, -50);
        assert_eq!(agg.get(&addr(49)).unwrap().signal_strength, -50);
    }

    #[test]
    fn test_zero_initial_capacity_still_grows() {
        let mut agg = Aggregator::with_capacity(0);
        assert_eq!(agg.add_or_update(record(1, -50, None)), Outcome::Inserted);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_ceiling_drops_new_devices_but_merges_known() {
        let mut agg = Aggregator::new().with_ceiling(Some(2));
        assert_eq!(agg.add_or_update(record(1, -80, None)), Outcome::Inserted);
        assert_eq!(agg.add_or_update(record(2, -80, None)), Outcome::Inserted);
        assert_eq!(agg.add_or_update(record(3, -10, None)), Outcome::Dropped);
        assert_eq!(agg.add_or_update(record(1, -30, None)), Outcome::Merged);

        assert_eq!(agg.len(), 2);
        assert!(agg.get(&addr(3)).is_none());
        assert_eq!(agg.get(&addr(1)).unwrap().signal_strength, -30);
    }

    #[test]
    fn test_empty_drain() {
        let agg = Aggregator::default();
        assert!(agg.is_empty());
        assert!(agg.drain_sorted().is_empty());
    }
}
