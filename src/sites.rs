/// Treatment site registry for the compliance analysis.
///
/// Defines the canonical list of treatment sites sampled in the dataset.
/// This is the single source of truth for site identifiers: the loader
/// rejects any row whose site is not listed in the active configuration,
/// which defaults to the codes below.

// ---------------------------------------------------------------------------
// Site metadata
// ---------------------------------------------------------------------------

/// Metadata for a single treatment site.
pub struct Site {
    /// Identifier exactly as it appears in the `Location` column.
    pub code: &'static str,
    /// Human-readable name used in chart legends.
    pub name: &'static str,
}

/// All treatment sites covered by the sample snapshot, in code order.
pub static SITE_REGISTRY: &[Site] = &[
    Site {
        code: "Site A",
        name: "Treatment Works A",
    },
    Site {
        code: "Site B",
        name: "Treatment Works B",
    },
    Site {
        code: "Site C",
        name: "Treatment Works C",
    },
    Site {
        code: "Site D",
        name: "Treatment Works D",
    },
    Site {
        code: "Site E",
        name: "Treatment Works E",
    },
    Site {
        code: "Site F",
        name: "Treatment Works F",
    },
];

/// Returns the codes for all registered sites as owned strings,
/// suitable for seeding `AnalysisConfig::known_sites`.
pub fn all_site_codes() -> Vec<String> {
    SITE_REGISTRY.iter().map(|s| s.code.to_string()).collect()
}

/// Looks up a site by code. Returns `None` if not found.
pub fn find_site(code: &str) -> Option<&'static Site> {
    SITE_REGISTRY.iter().find(|s| s.code == code)
}

/// Display name for a site code, falling back to the code itself for sites
/// supplied through configuration rather than the registry.
pub fn display_name(code: &str) -> &str {
    find_site(code).map(|s| s.name).unwrap_or(code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
