use tracing::debug;

/// Rows remaining after the last visible row at which the next page is
/// requested.
pub const DEFAULT_THRESHOLD_ROWS: usize = 2;

/// Flags owned by the data source. The engine only reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationState {
    pub has_more: bool,
    pub is_fetching: bool,
}

/// Decides when to ask the data source for the next page.
///
/// Fires once per crossing into the end zone. After firing it stays quiet
/// until the window leaves the zone, or until new items have arrived and
/// the source is idle again.
#[derive(Debug, Clone)]
pub struct PaginationTrigger {
    threshold_rows: usize,
    armed: bool,
    items_at_fire: usize,
    fired: u64,
}

impl Default for PaginationTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_ROWS)
    }
}

impl PaginationTrigger {
    pub fn new(threshold_rows: usize) -> Self {
        Self {
            threshold_rows,
            armed: true,
            items_at_fire: 0,
            fired: 0,
        }
    }

    /// Whether the window touches the last `threshold_rows` rows. An empty
    /// row set counts as being at the end.
    pub fn is_near_end(&self, last_visible: Option<usize>, row_count: usize) -> bool {
        match last_visible {
            _ if row_count == 0 => true,
            Some(last) => last + self.threshold_rows + 1 >= row_count,
            None => false,
        }
    }

    /// Evaluates one window recomputation. Returns true when the caller
    /// must invoke the source's `fetch_next` now.
    pub fn evaluate(
        &mut self,
        last_visible: Option<usize>,
        row_count: usize,
        item_count: usize,
        state: PaginationState,
    ) -> bool {
        let near_end = self.is_near_end(last_visible, row_count);

        if !self.armed {
            let grew = item_count != self.items_at_fire;
            if !near_end || (grew && !state.is_fetching) {
                self.armed = true;
            }
        }

        if !(near_end && self.armed && state.has_more && !state.is_fetching) {
            return false;
        }

        self.armed = false;
        self.items_at_fire = item_count;
        self.fired += 1;
        debug!(
            ?last_visible,
            row_count, item_count, "Requesting next page"
        );
        true
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn reset(&mut self) {
        self.armed = true;
        self.items_at_fire = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: PaginationState = PaginationState {
        has_more: true,
        is_fetching: false,
    };
    const FETCHING: PaginationState = PaginationState {
        has_more: true,
        is_fetching: true,
    };

    #[test]
    fn test_threshold_is_two_rows_from_the_end() {
        let trigger = PaginationTrigger::default();
        assert!(!trigger.is_near_end(Some(6), 10));
        assert!(trigger.is_near_end(Some(7), 10));
        assert!(trigger.is_near_end(Some(9), 10));
        assert!(trigger.is_near_end(None, 0));
        assert!(!trigger.is_near_end(None, 10));
    }

    #[test]
    fn test_fires_once_per_crossing() {
        let mut trigger = PaginationTrigger::default();
        assert!(!trigger.evaluate(Some(3), 10, 50, IDLE));
        assert!(trigger.evaluate(Some(8), 10, 50, IDLE));

        // Source flips to fetching; further scroll events inside the zone.
        assert!(!trigger.evaluate(Some(9), 10, 50, FETCHING));
        assert!(!trigger.evaluate(Some(9), 10, 50, FETCHING));
        // Fetch finished without new items: not re-crossed yet.
        assert!(!trigger.evaluate(Some(9), 10, 50, IDLE));
        assert_eq!(trigger.fired(), 1);

        // Leave and re-enter the zone.
        assert!(!trigger.evaluate(Some(4), 10, 50, IDLE));
        assert!(trigger.evaluate(Some(8), 10, 50, IDLE));
        assert_eq!(trigger.fired(), 2);
    }

    #[test]
    fn test_rearms_when_new_items_arrive() {
        let mut trigger = PaginationTrigger::default();
        assert!(trigger.evaluate(Some(9), 10, 50, IDLE));
        // Page arrived but the window still sits near the (new) end.
        assert!(!trigger.evaluate(Some(11), 12, 60, FETCHING));
        assert!(trigger.evaluate(Some(11), 12, 60, IDLE));
    }

    #[test]
    fn test_respects_source_flags() {
        let mut trigger = PaginationTrigger::default();
        let exhausted = PaginationState {
            has_more: false,
            is_fetching: false,
        };
        assert!(!trigger.evaluate(Some(9), 10, 50, exhausted));
        assert!(!trigger.evaluate(Some(9), 10, 50, FETCHING));
        assert!(trigger.evaluate(Some(9), 10, 50, IDLE));
    }
}
