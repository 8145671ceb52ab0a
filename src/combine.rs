use crate::vigenere::Key;

/// Upper bound on candidate keys produced from one set of shift options.
pub const MAX_COMBINATIONS : usize = 5000;

/// Cartesian product of per-position shifts, truncated at `MAX_COMBINATIONS`.
/// Earlier options are expanded first, so the best-ranked shifts survive truncation.
pub fn combine_shifts(options : &[Vec<u8>]) -> Vec<Key> {
    if options.is_empty() || options.iter().any(|o| o.is_empty()) {
        return Vec::new();
    }

    let mut partial : Vec<Vec<u8>> = vec![Vec::with_capacity(options.len())];

    for position in options {
        let mut next = Vec::with_capacity((partial.len() * position.len()).min(MAX_COMBINATIONS));

        'expand: for prefix in &partial {
            for shift in position {
                if next.len() >= MAX_COMBINATIONS {
                    break 'expand;
                }

                let mut shifts = prefix.clone();
                shifts.push(*shift);
                next.push(shifts);
            }
        }

        partial = next;
    }

    partial.iter()
        .filter_map(|shifts| Key::from_shifts(shifts))
        .collect()
}
