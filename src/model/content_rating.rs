pub const G: i32 = 1;
pub const PG: i32 = 2;
pub const PG13: i32 = 3;
pub const R: i32 = 4;
pub const NR: i32 = 5;

/// Slack teams search up to and including this rating unless configured otherwise.
pub const FILTER_DEFAULT: i32 = NR;
pub const FILTER_ALL: i32 = 6;

pub fn is_valid(rating: i32) -> bool {
    (G..=NR).contains(&rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ratings_are_g_through_nr() {
        assert!(!is_valid(0));
        assert!(is_valid(G));
        assert!(is_valid(PG13));
        assert!(is_valid(NR));
        assert!(!is_valid(FILTER_ALL));
    }
}
