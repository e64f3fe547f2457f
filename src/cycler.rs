use parking_lot::RwLock;

/// Cycles through a fixed, ordered set of legal values for a discrete device
/// setting, such as the auto-off duration.
///
/// Two advance modes are provided: [`next`](Self::next) rotates through the
/// values in construction order, while [`next_greater`](Self::next_greater)
/// picks the successor of whatever value the device currently reports,
/// wrapping to the smallest legal value at the top of the range.
///
/// Reads and the single logical writer may race from different tasks; the
/// rotation index sits behind a lock and the sorted lookup table is immutable
/// after construction.
pub struct SettingsCycler<T> {
    settings: Vec<T>,
    sorted: Vec<T>,
    index: RwLock<usize>,
}

impl<T: Copy + Ord> SettingsCycler<T> {
    /// Builds a cycler over the given legal values, in rotation order.
    ///
    /// Panics if `settings` is empty.
    pub fn new(settings: Vec<T>) -> Self {
        assert!(!settings.is_empty(), "settings list must not be empty");

        let mut sorted = settings.clone();
        sorted.sort_unstable();

        Self {
            settings,
            sorted,
            index: RwLock::new(0),
        }
    }

    /// Returns the value at the rotation cursor and advances it, wrapping to
    /// the first value after the last.
    pub fn next(&self) -> T {
        let mut index = self.index.write();
        let current = self.settings[*index];
        *index = (*index + 1) % self.settings.len();
        current
    }

    /// Returns the smallest legal value strictly greater than `current`, or
    /// the smallest legal value overall when `current` is at or above the
    /// maximum.
    ///
    /// `current` is whatever the device last reported, which need not itself
    /// be a legal value.
    pub fn next_greater(&self, current: T) -> T {
        let idx = self.sorted.partition_point(|s| *s <= current);
        if idx < self.sorted.len() {
            self.sorted[idx]
        } else {
            self.sorted[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_rotates_and_wraps() {
        let cycler = SettingsCycler::new(vec![5u16, 10, 15, 20, 30]);
        assert_eq!(cycler.next(), 5);
        assert_eq!(cycler.next(), 10);
        assert_eq!(cycler.next(), 15);
        assert_eq!(cycler.next(), 20);
        assert_eq!(cycler.next(), 30);
        assert_eq!(cycler.next(), 5);
    }

    #[test]
    fn next_greater_finds_successor() {
        let cycler = SettingsCycler::new(vec![5u16, 10, 15, 20, 30]);
        assert_eq!(cycler.next_greater(5), 10);
        assert_eq!(cycler.next_greater(15), 20);
        // Reported values between legal settings still advance correctly.
        assert_eq!(cycler.next_greater(12), 15);
        assert_eq!(cycler.next_greater(0), 5);
    }

    #[test]
    fn next_greater_wraps_at_maximum() {
        let cycler = SettingsCycler::new(vec![5u16, 10, 15, 20, 30]);
        assert_eq!(cycler.next_greater(30), 5);
        assert_eq!(cycler.next_greater(200), 5);
    }

    #[test]
    fn next_greater_is_idempotent_for_fixed_input() {
        let cycler = SettingsCycler::new(vec![5u16, 10, 15, 20, 30]);
        for _ in 0..10 {
            assert_eq!(cycler.next_greater(10), 15);
        }
    }

    #[test]
    fn unsorted_construction_order_is_respected_by_rotation_only() {
        let cycler = SettingsCycler::new(vec![30u16, 5, 20]);
        assert_eq!(cycler.next(), 30);
        assert_eq!(cycler.next(), 5);
        // next_greater always works over the sorted view.
        assert_eq!(cycler.next_greater(5), 20);
        assert_eq!(cycler.next_greater(30), 5);
    }
}
