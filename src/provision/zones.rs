//! Availability-zone ordering for sequential creation attempts.

/// Moves the preferred zone to the front of the candidate list.
///
/// The promotion is a single positional swap with whatever occupies index
/// 0: the former head takes the preferred zone's old slot and every other
/// entry stays put. A transposition, not a stable rotation. An empty or
/// absent preferred zone leaves the list untouched.
pub(crate) fn promote_preferred(zones: &mut [String], preferred: &str) {
    if preferred.is_empty() {
        return;
    }
    if let Some(position) = zones.iter().position(|zone| zone == preferred) {
        zones.swap(0, position);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[rstest]
    #[case(&["az1", "az2", "az3"], "az2", &["az2", "az1", "az3"])]
    #[case(&["az1", "az2", "az3"], "az3", &["az3", "az2", "az1"])]
    #[case(&["az1", "az2", "az3"], "az1", &["az1", "az2", "az3"])]
    #[case(&["az1", "az2", "az3"], "", &["az1", "az2", "az3"])]
    #[case(&["az1", "az2", "az3"], "az9", &["az1", "az2", "az3"])]
    #[case(&[], "az1", &[])]
    fn promotion_swaps_head_with_preferred(
        #[case] input: &[&str],
        #[case] preferred: &str,
        #[case] expected: &[&str],
    ) {
        let mut candidates = zones(input);
        promote_preferred(&mut candidates, preferred);
        assert_eq!(candidates, zones(expected));
    }

    /// The promotion transposes exactly two entries; everything between the
    /// old head position and the preferred zone's slot keeps its index.
    #[test]
    fn promotion_from_deep_in_the_list_is_a_transposition() {
        let mut candidates = zones(&["az1", "az2", "az3", "az4"]);
        promote_preferred(&mut candidates, "az4");
        assert_eq!(candidates, zones(&["az4", "az2", "az3", "az1"]));
    }
}
