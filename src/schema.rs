use crate::{IngestError, IngestResult};

/// Destination table for the COPY.
pub const TARGET_TABLE: &str = "domain_ranking";

/// Column order of `domain_ranking`; every [`Row`] follows it.
pub const TARGET_COLUMNS: [&str; 12] = [
    "global_rank",
    "tld_rank",
    "domain",
    "tld",
    "ref_subnets",
    "ref_ips",
    "idn_domain",
    "idn_tld",
    "prev_global_rank",
    "prev_tld_rank",
    "prev_ref_subnets",
    "prev_ref_ips",
];

/// Normalized CSV header token -> target column.
///
/// Both the concatenated form shipped by Majestic (`GlobalRank`) and the
/// snake_case form (`global_rank`) are accepted.
pub const HEADER_ALIASES: &[(&str, &str)] = &[
    ("globalrank", "global_rank"),
    ("global_rank", "global_rank"),
    ("tldrank", "tld_rank"),
    ("tld_rank", "tld_rank"),
    ("domain", "domain"),
    ("tld", "tld"),
    ("refsubnets", "ref_subnets"),
    ("ref_subnets", "ref_subnets"),
    ("refips", "ref_ips"),
    ("ref_ips", "ref_ips"),
    ("idndomain", "idn_domain"),
    ("idn_domain", "idn_domain"),
    ("idntld", "idn_tld"),
    ("idn_tld", "idn_tld"),
    ("prevglobalrank", "prev_global_rank"),
    ("prev_global_rank", "prev_global_rank"),
    ("prevtldrank", "prev_tld_rank"),
    ("prev_tld_rank", "prev_tld_rank"),
    ("prevrefsubnets", "prev_ref_subnets"),
    ("prev_ref_subnets", "prev_ref_subnets"),
    ("prevrefips", "prev_ref_ips"),
    ("prev_ref_ips", "prev_ref_ips"),
];

/// One reshaped record, element `i` belongs to `TARGET_COLUMNS[i]`.
pub type Row = Vec<String>;

/// Lowercase and trim; nothing else.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Resolve every raw header token to its target column name.
///
/// Fails on the first token that has no alias, reporting the token as it
/// appeared in the file.
pub fn map_headers<'h, I>(headers: I, aliases: &[(&str, &'static str)]) -> IngestResult<Vec<&'static str>>
where
    I: IntoIterator<Item = &'h str>,
{
    headers
        .into_iter()
        .map(|raw| {
            let key = normalize_header(raw);
            aliases
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, column)| *column)
                .ok_or_else(|| IngestError::UnknownHeader(raw.to_string()))
        })
        .collect()
}

/// Positions of each target column inside a CSV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Widest CSV record position referenced, i.e. the minimum record length.
    pub fn required_width(&self) -> usize {
        self.0.iter().max().map(|m| m + 1).unwrap_or(0)
    }

    /// Build a fresh row where `row[i] = field(self[i])`.
    ///
    /// Returns `None` when the record is too short for some position.
    pub fn reshape<'r, F>(&self, field: F) -> Option<Row>
    where
        F: Fn(usize) -> Option<&'r str>,
    {
        self.0
            .iter()
            .map(|&idx| field(idx).map(str::to_owned))
            .collect()
    }
}

/// For each target column pick the first CSV position carrying it.
pub fn build_permutation(mapped: &[&str], columns: &[&str]) -> IngestResult<Permutation> {
    columns
        .iter()
        .map(|column| {
            mapped
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| IngestError::MissingColumn(column.to_string()))
        })
        .collect::<IngestResult<Vec<_>>>()
        .map(Permutation)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: [&str; 12] = [
        "GlobalRank",
        "TldRank",
        "Domain",
        "TLD",
        "RefSubNets",
        "RefIPs",
        "IDN_Domain",
        "IDN_TLD",
        "PrevGlobalRank",
        "PrevTldRank",
        "PrevRefSubNets",
        "PrevRefIPs",
    ];

    fn permute(raw: &[&str]) -> Permutation {
        let mapped = map_headers(raw.iter().copied(), HEADER_ALIASES).unwrap();
        build_permutation(&mapped, &TARGET_COLUMNS).unwrap()
    }

    #[test]
    fn every_alias_targets_a_known_column() {
        for (_, column) in HEADER_ALIASES {
            assert!(TARGET_COLUMNS.contains(column), "{column}");
        }
        for column in TARGET_COLUMNS {
            assert!(HEADER_ALIASES.iter().any(|(_, c)| *c == column), "{column}");
        }
    }

    #[test]
    fn normalizes_case_and_whitespace_only() {
        assert_eq!(normalize_header("  GlobalRank\t"), "globalrank");
        assert_eq!(normalize_header("IDN_TLD"), "idn_tld");
        assert_eq!(normalize_header("Global Rank"), "global rank");
    }

    #[test]
    fn canonical_header_is_identity() {
        let perm = permute(&CANONICAL);
        assert_eq!(perm.indices(), &(0..12).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn applying_permutation_to_mapped_header_yields_target_order() {
        let mut orders: Vec<Vec<&str>> = Vec::new();
        let mut reversed = CANONICAL.to_vec();
        reversed.reverse();
        orders.push(reversed);
        for shift in [1, 5, 11] {
            let mut rotated = CANONICAL.to_vec();
            rotated.rotate_left(shift);
            orders.push(rotated);
        }
        orders.push(TARGET_COLUMNS.to_vec());

        for raw in orders {
            let mapped = map_headers(raw.iter().copied(), HEADER_ALIASES).unwrap();
            let perm = build_permutation(&mapped, &TARGET_COLUMNS).unwrap();
            let applied: Vec<&str> = perm.indices().iter().map(|&i| mapped[i]).collect();
            assert_eq!(applied, TARGET_COLUMNS.to_vec());
        }
    }

    #[test]
    fn reshape_picks_fields_by_position() {
        let raw = [
            "Domain",
            "TLD",
            "GlobalRank",
            "TldRank",
            "RefSubNets",
            "RefIPs",
            "IDN_Domain",
            "IDN_TLD",
            "PrevGlobalRank",
            "PrevTldRank",
            "PrevRefSubNets",
            "PrevRefIPs",
        ];
        let perm = permute(&raw);
        let record = [
            "wikipedia.org",
            "org",
            "6",
            "1",
            "450000",
            "800000",
            "wikipedia.org",
            "org",
            "6",
            "1",
            "449000",
            "799000",
        ];
        let row = perm.reshape(|i| record.get(i).copied()).unwrap();
        assert_eq!(
            row,
            vec![
                "6",
                "1",
                "wikipedia.org",
                "org",
                "450000",
                "800000",
                "wikipedia.org",
                "org",
                "6",
                "1",
                "449000",
                "799000"
            ]
        );
        assert!(perm.reshape(|i| record[..4].get(i).copied()).is_none());
    }

    #[test]
    fn unknown_header_reports_raw_token() {
        let err = map_headers(["Domain", " Foo "], HEADER_ALIASES).unwrap_err();
        assert!(matches!(err, IngestError::UnknownHeader(h) if h == " Foo "));
    }

    #[test]
    fn missing_column_is_reported() {
        let mapped = map_headers(CANONICAL[..11].iter().copied(), HEADER_ALIASES).unwrap();
        let err = build_permutation(&mapped, &TARGET_COLUMNS).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn(c) if c == "prev_ref_ips"));
    }

    #[test]
    fn duplicate_columns_resolve_to_first_occurrence() {
        let mut raw = CANONICAL.to_vec();
        raw.push("global_rank");
        let perm = permute(&raw);
        assert_eq!(perm.indices()[0], 0);
        assert_eq!(perm.required_width(), 12);
    }
}
