// ─── Runtime Identifier Fallback ───

use std::collections::{BTreeMap, HashSet};
use std::env;

use crate::platform;

/// Overrides the computed host RID.
pub const ENV_RUNTIME_ID: &str = "COREHOST_RUNTIME_ID";

/// Host RID: environment override first, else `os-arch`.
pub fn host_rid() -> String {
    env::var(ENV_RUNTIME_ID)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(portable_host_rid)
}

/// The compiled-in `os-arch` RID for this build.
pub fn portable_host_rid() -> String {
    format!("{}-{}", platform::platform_os(), platform::platform_arch())
}

/// Fallback chain used when no fallback graph is present: the host RID
/// itself, then `os-arch`, `os`, broader OS families, then `any`.
pub fn portable_chain(host: &str) -> Vec<String> {
    let os = platform::platform_os();
    let mut chain = vec![host.to_string(), portable_host_rid(), os.to_string()];
    if os != "win" && os != "unix" {
        chain.push("unix".to_string());
    }
    chain.push("any".to_string());
    dedup_preserving_order(chain)
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// Pick the RID group for one library/asset-type.
///
/// With a fallback graph: exact host match first, then the graph's ordered
/// fallback list for the host. Without one: walk the portable chain. `None`
/// means the caller should fall back to the flat (non-RID) assets.
pub fn select_rid<F>(
    host: &str,
    graph: Option<&BTreeMap<String, Vec<String>>>,
    has_assets: F,
) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    match graph {
        Some(graph) => {
            if has_assets(host) {
                return Some(host.to_string());
            }
            graph
                .get(host)
                .into_iter()
                .flatten()
                .find(|rid| has_assets(rid))
                .cloned()
        }
        None => portable_chain(host).into_iter().find(|rid| has_assets(rid)),
    }
}
