use chrono::{Datelike, NaiveDate, Weekday};

/// True for Monday..Friday that are not in `holidays`.
///
/// `holidays` is empty unless the holiday-exclusion policy switch is on;
/// the stock behavior counts public holidays as consumable days.
pub fn is_working_day(day: NaiveDate, holidays: &[NaiveDate]) -> bool {
    if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    !holidays.contains(&day)
}

/// Number of leave units consumed by a `(start, end, half_day)` span,
/// both ends inclusive. A half-day span (start == end) yields 0.5.
///
/// Callers must have rejected `start > end` already; a span covering only
/// weekends/holidays comes back as 0.0 and must be rejected as well, since
/// it grants no effective leave.
pub fn compute_units(
    start: NaiveDate,
    end: NaiveDate,
    half_day: bool,
    holidays: &[NaiveDate],
) -> f64 {
    let mut days = 0u32;
    let mut day = start;
    while day <= end {
        if is_working_day(day, holidays) {
            days += 1;
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break, // end of calendar range
        };
    }

    if half_day {
        if days > 0 { 0.5 } else { 0.0 }
    } else {
        f64::from(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn monday_to_friday_is_five_units() {
        assert_eq!(compute_units(d("2026-03-02"), d("2026-03-06"), false, &[]), 5.0);
    }

    #[test]
    fn span_over_a_weekend_skips_saturday_and_sunday() {
        // Fri 2026-03-06 .. Mon 2026-03-09
        assert_eq!(compute_units(d("2026-03-06"), d("2026-03-09"), false, &[]), 2.0);
    }

    #[test]
    fn weekend_only_span_is_zero() {
        assert_eq!(compute_units(d("2026-03-07"), d("2026-03-08"), false, &[]), 0.0);
    }

    #[test]
    fn half_day_is_half_a_unit() {
        assert_eq!(compute_units(d("2026-03-04"), d("2026-03-04"), true, &[]), 0.5);
    }

    #[test]
    fn half_day_on_a_weekend_is_zero() {
        assert_eq!(compute_units(d("2026-03-07"), d("2026-03-07"), true, &[]), 0.0);
    }

    #[test]
    fn holidays_counted_by_default() {
        // No holiday list supplied: the Wednesday still consumes a unit.
        assert_eq!(compute_units(d("2026-03-02"), d("2026-03-06"), false, &[]), 5.0);
    }

    #[test]
    fn holidays_excluded_when_listed() {
        let holidays = vec![d("2026-03-04")];
        assert_eq!(
            compute_units(d("2026-03-02"), d("2026-03-06"), false, &holidays),
            4.0
        );
    }
}
