//! Row selection across streams with different timeframes.

use chrono::NaiveDateTime;

/// A stream that delivered on this poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub index: usize,
    pub dt: NaiveDateTime,
    pub resample_only: bool,
}

/// Timestamp of the row assembled on this poll.
///
/// When raw and resample-only streams are mixed, only raw streams drive the
/// clock; a resample-only stream cannot pull the row time forward.
pub(crate) fn row_time(delivered: &[Candidate], mixed: bool) -> Option<NaiveDateTime> {
    let drivers = delivered
        .iter()
        .filter(|c| !mixed || !c.resample_only)
        .map(|c| c.dt)
        .min();
    drivers.or_else(|| delivered.iter().map(|c| c.dt).min())
}

/// Splits the delivered streams into those joining the row and those that
/// must be rewound because they are ahead of it.
pub(crate) fn partition(delivered: &[Candidate], dt0: NaiveDateTime) -> (Vec<usize>, Vec<usize>) {
    let mut join = Vec::with_capacity(delivered.len());
    let mut rewind = Vec::new();
    for c in delivered {
        if c.dt > dt0 {
            rewind.push(c.index);
        } else {
            join.push(c.index);
        }
    }
    (join, rewind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn cand(index: usize, dt: NaiveDateTime, resample_only: bool) -> Candidate {
        Candidate {
            index,
            dt,
            resample_only,
        }
    }

    #[test]
    fn minimum_across_raw_streams() {
        let d = [cand(0, at(10, 5), false), cand(1, at(10, 1), false)];
        let dt0 = row_time(&d, false).unwrap();
        assert_eq!(dt0, at(10, 1));
        assert_eq!(partition(&d, dt0), (vec![1], vec![0]));
    }

    #[test]
    fn resample_only_streams_do_not_drive_the_clock() {
        let d = [cand(0, at(10, 7), false), cand(1, at(10, 5), true)];
        let dt0 = row_time(&d, true).unwrap();
        assert_eq!(dt0, at(10, 7));
        // An aggregated bar stamped before the row still joins it.
        assert_eq!(partition(&d, dt0), (vec![0, 1], vec![]));
    }

    #[test]
    fn resample_only_alone_falls_back_to_its_own_time() {
        let d = [cand(1, at(10, 5), true)];
        assert_eq!(row_time(&d, true), Some(at(10, 5)));
        assert_eq!(row_time(&[], false), None);
    }
}
