use chrono::NaiveTime;

/// Day a booking occupies. Stored as the lowercase full name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" => Some(Self::Monday),
            "tuesday" => Some(Self::Tuesday),
            "wednesday" => Some(Self::Wednesday),
            "thursday" => Some(Self::Thursday),
            "friday" => Some(Self::Friday),
            "saturday" => Some(Self::Saturday),
            "sunday" => Some(Self::Sunday),
            _ => None,
        }
    }

    /// Position within the week, Monday first. Used for timetable ordering.
    pub fn index(self) -> u8 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

/// Parse an "HH:MM" wall-clock value to minutes since midnight.
pub fn parse_time_minutes(s: &str) -> Option<i64> {
    use chrono::Timelike;
    let t = NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()?;
    Some(i64::from(t.hour()) * 60 + i64::from(t.minute()))
}

pub fn format_time_minutes(min: i64) -> String {
    format!("{:02}:{:02}", min / 60, min % 60)
}

/// Half-open interval intersection: [s1,e1) and [s2,e2) share an instant
/// iff s1 < e2 and e1 > s2. Adjacent slots (e1 == s2) do not overlap, and
/// a zero-length interval overlaps nothing.
pub fn overlaps(s1: i64, e1: i64, s2: i64, e2: i64) -> bool {
    s1 < e2 && e1 > s2
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub id: String,
    pub group_id: String,
    pub classroom_id: String,
    pub course_id: String,
    pub teacher_id: String,
    pub day_of_week: String,
    pub start_min: i64,
    pub end_min: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (540, 600, 570, 630),
            (540, 600, 600, 660),
            (540, 600, 500, 550),
            (540, 600, 545, 555),
            (540, 600, 540, 600),
        ];
        for (s1, e1, s2, e2) in cases {
            assert_eq!(
                overlaps(s1, e1, s2, e2),
                overlaps(s2, e2, s1, e1),
                "symmetry failed for [{s1},{e1}) vs [{s2},{e2})"
            );
        }
    }

    #[test]
    fn interval_overlaps_itself() {
        assert!(overlaps(540, 600, 540, 600));
    }

    #[test]
    fn zero_length_interval_overlaps_nothing() {
        assert!(!overlaps(540, 540, 500, 600));
        assert!(!overlaps(500, 600, 540, 540));
        assert!(!overlaps(540, 540, 540, 540));
    }

    #[test]
    fn adjacent_slots_do_not_overlap() {
        assert!(!overlaps(540, 600, 600, 660));
        assert!(!overlaps(600, 660, 540, 600));
    }

    #[test]
    fn containment_counts_as_overlap() {
        // One interval fully inside the other, either way around.
        assert!(overlaps(540, 600, 550, 560));
        assert!(overlaps(550, 560, 540, 600));
    }

    #[test]
    fn partial_overlap_either_direction() {
        assert!(overlaps(540, 600, 570, 630));
        assert!(overlaps(570, 630, 540, 600));
    }

    #[test]
    fn parse_time_accepts_hh_mm_only() {
        assert_eq!(parse_time_minutes("09:00"), Some(540));
        assert_eq!(parse_time_minutes("23:59"), Some(1439));
        assert_eq!(parse_time_minutes(" 10:30 "), Some(630));
        assert_eq!(parse_time_minutes("24:00"), None);
        assert_eq!(parse_time_minutes("9"), None);
        assert_eq!(parse_time_minutes(""), None);
    }

    #[test]
    fn format_time_round_trips() {
        assert_eq!(format_time_minutes(540), "09:00");
        assert_eq!(format_time_minutes(1439), "23:59");
        assert_eq!(parse_time_minutes(&format_time_minutes(615)), Some(615));
    }

    #[test]
    fn day_of_week_parse_is_case_insensitive_full_names() {
        assert_eq!(DayOfWeek::parse("Monday"), Some(DayOfWeek::Monday));
        assert_eq!(DayOfWeek::parse("FRIDAY"), Some(DayOfWeek::Friday));
        assert_eq!(DayOfWeek::parse("mon"), None);
        assert_eq!(DayOfWeek::parse(""), None);
    }
}
