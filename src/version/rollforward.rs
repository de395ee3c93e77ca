use std::fmt;

use tracing::debug;

use super::model::HostVersion;

/// Version roll-forward policy for a framework reference.
///
/// Wire values are case-insensitive: `disable`, `latestPatch`, `minor`,
/// `latestMinor`, `major`, `latestMajor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollForward {
    Disable,
    LatestPatch,
    #[default]
    Minor,
    LatestMinor,
    Major,
    LatestMajor,
}

impl RollForward {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "disable" => Some(Self::Disable),
            "latestpatch" => Some(Self::LatestPatch),
            "minor" => Some(Self::Minor),
            "latestminor" => Some(Self::LatestMinor),
            "major" => Some(Self::Major),
            "latestmajor" => Some(Self::LatestMajor),
            _ => None,
        }
    }
}

impl fmt::Display for RollForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disable => "disable",
            Self::LatestPatch => "latestPatch",
            Self::Minor => "minor",
            Self::LatestMinor => "latestMinor",
            Self::Major => "major",
            Self::LatestMajor => "latestMajor",
        };
        write!(f, "{name}")
    }
}

/// A candidate-selection strategy: pure function over the ascending-sorted
/// candidate list. Strategies are tried in sequence until one yields a hit,
/// which gives each policy its fallback chain (major → minor → patch → exact).
type Strategy = fn(&HostVersion, bool, &[HostVersion]) -> Option<HostVersion>;

fn strategy_chain(policy: RollForward) -> &'static [Strategy] {
    match policy {
        RollForward::Disable => &[exact],
        RollForward::LatestPatch => &[latest_patch, exact],
        RollForward::Minor => &[closest_minor, latest_patch, exact],
        RollForward::LatestMinor => &[latest_minor, latest_patch, exact],
        RollForward::Major => &[closest_major, closest_minor, latest_patch, exact],
        RollForward::LatestMajor => &[latest_major, latest_minor, latest_patch, exact],
    }
}

/// Select the best installed version for `requested` under `policy`.
///
/// A release request prefers release candidates; pre-release candidates are
/// admitted only when no release candidate satisfies the policy. A
/// pre-release request considers every candidate under the normal order.
pub fn best_match(
    policy: RollForward,
    apply_patches: bool,
    requested: &HostVersion,
    candidates: &[HostVersion],
) -> Option<HostVersion> {
    let mut sorted = candidates.to_vec();
    sorted.sort();

    if !requested.is_pre_release() {
        let releases: Vec<HostVersion> = sorted
            .iter()
            .filter(|v| !v.is_pre_release())
            .cloned()
            .collect();
        if let Some(hit) = run_chain(policy, apply_patches, requested, &releases) {
            return Some(hit);
        }
    }

    let hit = run_chain(policy, apply_patches, requested, &sorted);
    if let Some(v) = &hit {
        debug!(%requested, resolved = %v, %policy, "roll-forward matched");
    }
    hit
}

fn run_chain(
    policy: RollForward,
    apply_patches: bool,
    requested: &HostVersion,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    strategy_chain(policy)
        .iter()
        .find_map(|strategy| strategy(requested, apply_patches, sorted))
}

// ─── Strategies ──────────────────────────────────────────

fn exact(requested: &HostVersion, _apply_patches: bool, sorted: &[HostVersion]) -> Option<HostVersion> {
    sorted.iter().find(|v| *v == requested).cloned()
}

/// Highest version sharing `major.minor`, at or above the requested patch.
fn latest_patch(
    requested: &HostVersion,
    _apply_patches: bool,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    sorted
        .iter()
        .filter(|v| v.major == requested.major && v.minor == requested.minor && *v >= requested)
        .max()
        .cloned()
}

/// Nearest acceptable minor within the requested major; patch level within
/// that minor rolls to latest when `apply_patches`, else stays lowest.
fn closest_minor(
    requested: &HostVersion,
    apply_patches: bool,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    let compatible: Vec<&HostVersion> = sorted
        .iter()
        .filter(|v| v.major == requested.major && *v >= requested)
        .collect();
    let target_minor = compatible.iter().map(|v| v.minor).min()?;
    pick_patch(
        apply_patches,
        compatible.into_iter().filter(|v| v.minor == target_minor),
    )
}

/// Highest acceptable version within the requested major.
fn latest_minor(
    requested: &HostVersion,
    _apply_patches: bool,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    sorted
        .iter()
        .filter(|v| v.major == requested.major && *v >= requested)
        .max()
        .cloned()
}

/// Nearest acceptable major, then nearest minor inside it.
fn closest_major(
    requested: &HostVersion,
    apply_patches: bool,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    let compatible: Vec<&HostVersion> = sorted.iter().filter(|v| *v >= requested).collect();
    let target_major = compatible.iter().map(|v| v.major).min()?;
    let in_major: Vec<&HostVersion> = compatible
        .into_iter()
        .filter(|v| v.major == target_major)
        .collect();
    let target_minor = in_major.iter().map(|v| v.minor).min()?;
    pick_patch(
        apply_patches,
        in_major.into_iter().filter(|v| v.minor == target_minor),
    )
}

fn latest_major(
    requested: &HostVersion,
    _apply_patches: bool,
    sorted: &[HostVersion],
) -> Option<HostVersion> {
    sorted.iter().filter(|v| *v >= requested).max().cloned()
}

fn pick_patch<'a, I>(apply_patches: bool, group: I) -> Option<HostVersion>
where
    I: Iterator<Item = &'a HostVersion>,
{
    if apply_patches {
        group.max().cloned()
    } else {
        group.min().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(literals: &[&str]) -> Vec<HostVersion> {
        literals
            .iter()
            .map(|l| HostVersion::parse(l).unwrap())
            .collect()
    }

    fn req(literal: &str) -> HostVersion {
        HostVersion::parse(literal).unwrap()
    }

    #[test]
    fn minor_rolls_patch_within_nearest_minor() {
        let installed = versions(&["6.0.0", "6.0.5", "6.1.0"]);
        let hit = best_match(RollForward::Minor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.5");
    }

    #[test]
    fn latest_minor_takes_highest() {
        let installed = versions(&["6.0.0", "6.0.5", "6.1.0"]);
        let hit = best_match(RollForward::LatestMinor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.1.0");
    }

    #[test]
    fn disable_requires_exact() {
        let installed = versions(&["6.0.1", "6.0.2"]);
        assert!(best_match(RollForward::Disable, true, &req("6.0.0"), &installed).is_none());

        let installed = versions(&["6.0.0", "6.0.2"]);
        let hit = best_match(RollForward::Disable, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.0");
    }

    #[test]
    fn latest_patch_stays_within_minor() {
        let installed = versions(&["6.0.3", "6.0.9", "6.1.4"]);
        let hit = best_match(RollForward::LatestPatch, true, &req("6.0.1"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.9");
    }

    #[test]
    fn minor_advances_when_requested_minor_absent() {
        let installed = versions(&["6.1.2", "6.2.0"]);
        let hit = best_match(RollForward::Minor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.1.2");
    }

    #[test]
    fn minor_never_crosses_major() {
        let installed = versions(&["7.0.0"]);
        assert!(best_match(RollForward::Minor, true, &req("6.0.0"), &installed).is_none());
    }

    #[test]
    fn major_crosses_to_nearest_major() {
        let installed = versions(&["7.0.3", "8.0.1"]);
        let hit = best_match(RollForward::Major, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "7.0.3");
    }

    #[test]
    fn latest_major_takes_global_highest() {
        let installed = versions(&["7.0.3", "8.0.1"]);
        let hit = best_match(RollForward::LatestMajor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "8.0.1");
    }

    #[test]
    fn apply_patches_false_keeps_lowest_patch() {
        let installed = versions(&["6.0.0", "6.0.5"]);
        let hit = best_match(RollForward::Minor, false, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.0");
    }

    #[test]
    fn older_versions_never_match() {
        let installed = versions(&["5.9.9", "6.0.0-rc.2"]);
        assert!(best_match(RollForward::LatestMajor, true, &req("6.0.0"), &installed).is_none());
    }

    #[test]
    fn release_request_prefers_release_candidates() {
        let installed = versions(&["6.0.2-rc.1", "6.0.1"]);
        let hit = best_match(RollForward::Minor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.1");
    }

    #[test]
    fn release_request_accepts_pre_release_as_last_resort() {
        let installed = versions(&["6.0.2-rc.1"]);
        let hit = best_match(RollForward::Minor, true, &req("6.0.0"), &installed).unwrap();
        assert_eq!(hit.to_string(), "6.0.2-rc.1");
    }

    #[test]
    fn pre_release_request_uses_plain_order() {
        let installed = versions(&["6.0.0-preview.2", "6.0.0-preview.5"]);
        let hit = best_match(
            RollForward::Minor,
            true,
            &req("6.0.0-preview.2"),
            &installed,
        )
        .unwrap();
        assert_eq!(hit.to_string(), "6.0.0-preview.5");
    }

    #[test]
    fn empty_candidate_set_yields_none() {
        assert!(best_match(RollForward::LatestMajor, true, &req("6.0.0"), &[]).is_none());
    }

    #[test]
    fn policy_parse_is_case_insensitive() {
        assert_eq!(RollForward::parse("LatestMinor"), Some(RollForward::LatestMinor));
        assert_eq!(RollForward::parse("DISABLE"), Some(RollForward::Disable));
        assert_eq!(RollForward::parse("sideways"), None);
    }
}
