//! Index, search, and fetch logic over a remote tree of community-maintained
//! tag dumps. A dump's path is `<material>/<subtype>/<colour>/<uid>/...-dump.json`;
//! each dump's signature region is genuine and can be reused when cloning.

mod client;
mod error;

pub use client::CatalogClient;
pub use error::CatalogError;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::format::Block;
use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS};

const CACHE_SNAPSHOT_FILE: &str = "catalog.json";

/// One indexed community dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    /// e.g. `"PLA"`.
    pub material: String,
    /// e.g. `"PLA Matte"`.
    pub subtype: String,
    /// e.g. `"Charcoal"`.
    pub color: String,
    /// Tag UID as it appears in the repository path.
    pub uid: String,
    /// Full path to the dump JSON within the remote tree.
    pub json_path: String,
}

impl TagEntry {
    /// `"<subtype> - <color>"`, for presentation.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.subtype, self.color)
    }

    /// `"<material>/<subtype>/<color>/<uid>"`, a stable identity string.
    pub fn id(&self) -> String {
        format!("{}/{}/{}/{}", self.material, self.subtype, self.color, self.uid)
    }

    fn from_path(path: &str) -> Option<Self> {
        if !path.ends_with("-dump.json") {
            return None;
        }
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 4 {
            return None;
        }
        Some(Self {
            material: parts[0].to_string(),
            subtype: parts[1].to_string(),
            color: parts[2].to_string(),
            uid: parts[3].to_string(),
            json_path: path.to_string(),
        })
    }
}

fn material_index(entries: &[TagEntry]) -> BTreeMap<String, Vec<String>> {
    let mut materials: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
    for entry in entries {
        materials
            .entry(entry.material.clone())
            .or_default()
            .insert(entry.subtype.clone());
    }
    materials
        .into_iter()
        .map(|(material, subtypes)| (material, subtypes.into_iter().collect()))
        .collect()
}

/// Index over the community dump catalog: the entry list plus the derived
/// material → sorted-subtypes lookup.
pub struct TagCatalog {
    client: CatalogClient,
    cache_dir: PathBuf,
    entries: Mutex<Vec<TagEntry>>,
    loaded: std::sync::atomic::AtomicBool,
    // Serializes loads so that concurrent callers racing on a cold cache
    // all observe the same completion instead of each issuing their own
    // remote fetch.
    load_guard: Mutex<()>,
}

impl std::fmt::Debug for TagCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCatalog")
            .field("cache_dir", &self.cache_dir)
            .field("is_loaded", &self.is_loaded())
            .finish()
    }
}

impl TagCatalog {
    /// Build a catalog bound to a remote client and a cache directory. The
    /// directory is created lazily on first use, not at construction.
    pub fn new(client: CatalogClient, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
            entries: Mutex::new(Vec::new()),
            loaded: std::sync::atomic::AtomicBool::new(false),
            load_guard: Mutex::new(()),
        }
    }

    /// Whether the index has completed its first load.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Load the index, from the on-disk snapshot when present and `force`
    /// is false, otherwise from the remote tree listing. Concurrent callers
    /// while the first load is in flight queue on the same guard and then
    /// observe the already-completed result.
    pub async fn load_index(&self, force: bool) -> Result<(), CatalogError> {
        let _guard = self.load_guard.lock().await;
        if self.is_loaded() && !force {
            return Ok(());
        }
        let result = self.do_load(force).await;
        if result.is_ok() {
            self.loaded.store(true, std::sync::atomic::Ordering::Release);
        }
        result
    }

    async fn do_load(&self, force: bool) -> Result<(), CatalogError> {
        let snapshot_path = self.cache_dir.join(CACHE_SNAPSHOT_FILE);

        if !force {
            if let Ok(bytes) = tokio::fs::read(&snapshot_path).await {
                match serde_json::from_slice::<Vec<TagEntry>>(&bytes) {
                    Ok(entries) => {
                        info!(count = entries.len(), "catalog: loaded index from cache");
                        *self.entries.lock().await = entries;
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(%err, "catalog: cache snapshot was unreadable, refreshing from remote");
                    }
                }
            }
        }

        let paths = self.client.fetch_tree_paths().await?;
        let entries: Vec<TagEntry> = paths.iter().filter_map(|p| TagEntry::from_path(p)).collect();
        info!(count = entries.len(), "catalog: indexed tag dumps from remote tree");

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let snapshot = serde_json::to_vec(&entries)
            .map_err(|err| CatalogError::malformed_response(format!("failed to serialize snapshot: {err}")))?;
        tokio::fs::write(&snapshot_path, snapshot).await?;

        *self.entries.lock().await = entries;
        Ok(())
    }

    /// Chained case-insensitive filters over the loaded entries, preserving
    /// original order.
    pub async fn search(
        &self,
        material: Option<&str>,
        subtype: Option<&str>,
        color: Option<&str>,
        query: Option<&str>,
    ) -> Vec<TagEntry> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| material.map_or(true, |m| e.material.eq_ignore_ascii_case(m)))
            .filter(|e| subtype.map_or(true, |s| e.subtype.eq_ignore_ascii_case(s)))
            .filter(|e| color.map_or(true, |c| e.color.to_lowercase().contains(&c.to_lowercase())))
            .filter(|e| {
                query.map_or(true, |q| {
                    let q = q.to_lowercase();
                    e.material.to_lowercase().contains(&q)
                        || e.subtype.to_lowercase().contains(&q)
                        || e.color.to_lowercase().contains(&q)
                        || e.uid.to_lowercase().contains(&q)
                })
            })
            .cloned()
            .collect()
    }

    /// Sorted unique colours available for a material/subtype pair.
    pub async fn colors_for(&self, material: &str, subtype: &str) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut colors: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for e in entries.iter() {
            if e.material == material && e.subtype == subtype {
                colors.insert(e.color.clone());
            }
        }
        colors.into_iter().collect()
    }

    /// Material → sorted-subtypes index, derived fresh from the current
    /// entry list.
    pub async fn materials(&self) -> BTreeMap<String, Vec<String>> {
        material_index(&self.entries.lock().await)
    }

    /// Download one entry's dump JSON, serving from the on-disk cache when
    /// present and fetching from the remote raw endpoint on a miss.
    pub async fn download(&self, entry: &TagEntry) -> Result<Value, CatalogError> {
        let cache_path = self.dump_cache_path(&entry.uid);
        if let Ok(bytes) = tokio::fs::read(&cache_path).await {
            if let Ok(value) = serde_json::from_slice(&bytes) {
                return Ok(value);
            }
            warn!(uid = %entry.uid, "catalog: cached dump was corrupt, refetching from remote");
        }

        let bytes = self.client.fetch_raw(&entry.json_path).await?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| CatalogError::malformed_response(format!("dump {} was not valid JSON: {err}", entry.uid)))?;

        if let Some(parent) = cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&cache_path, &bytes).await?;
        Ok(value)
    }

    fn dump_cache_path(&self, uid: &str) -> PathBuf {
        self.cache_dir.join(uid).join(format!("{uid}-dump.json"))
    }

    /// Look up a loaded entry by UID, for callers that only have a UID in
    /// hand (e.g. the cloning pipeline resuming from a cached dump).
    pub async fn find_by_uid(&self, uid: &str) -> Result<TagEntry, CatalogError> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.uid.eq_ignore_ascii_case(uid))
            .cloned()
            .ok_or_else(|| CatalogError::not_found(uid))
    }
}

/// Convert a dump's `"blocks"` object (stringified integer keys `"0"..="63"`)
/// into a 64-element block array. A missing key becomes 16 NUL bytes so
/// callers never observe a short array.
pub fn dump_to_blocks(dump: &Value) -> Result<Vec<Block>, CatalogError> {
    let blocks_obj = dump
        .get("blocks")
        .and_then(Value::as_object)
        .ok_or_else(|| CatalogError::malformed_response("dump has no `blocks` object"))?;

    let mut blocks = Vec::with_capacity(TOTAL_BLOCKS);
    for i in 0..TOTAL_BLOCKS {
        let hex_str = blocks_obj
            .get(&i.to_string())
            .and_then(Value::as_str)
            .unwrap_or("00000000000000000000000000000000");
        let bytes = hex::decode(hex_str)
            .map_err(|err| CatalogError::malformed_response(format!("block {i} was not valid hex: {err}")))?;
        if bytes.len() != BYTES_PER_BLOCK {
            return Err(CatalogError::malformed_response(format!(
                "block {i} decoded to {} bytes, expected {BYTES_PER_BLOCK}",
                bytes.len()
            )));
        }
        let mut block = [0u8; BYTES_PER_BLOCK];
        block.copy_from_slice(&bytes);
        blocks.push(block);
    }
    Ok(blocks)
}

/// Shared handle suitable for passing into the cloning pipeline and any
/// adapter layer.
pub type SharedCatalog = Arc<TagCatalog>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_from_path_requires_four_components_and_dump_suffix() {
        assert!(TagEntry::from_path("PLA/PLA Basic/Black/7AD43F1C/hf-mf-7AD43F1C-dump.json").is_some());
        assert!(TagEntry::from_path("PLA/PLA Basic/Black/hf-mf-dump.json").is_none());
        assert!(TagEntry::from_path("PLA/PLA Basic/Black/7AD43F1C/other.json").is_none());
    }

    #[test]
    fn entry_id_and_display_name() {
        let entry = TagEntry {
            material: "PLA".into(),
            subtype: "PLA Matte".into(),
            color: "Charcoal".into(),
            uid: "7AD43F1C".into(),
            json_path: "PLA/PLA Matte/Charcoal/7AD43F1C/hf-mf-7AD43F1C-dump.json".into(),
        };
        assert_eq!(entry.id(), "PLA/PLA Matte/Charcoal/7AD43F1C");
        assert_eq!(entry.display_name(), "PLA Matte - Charcoal");
    }

    #[test]
    fn material_index_groups_and_sorts_subtypes() {
        let entries = vec![
            TagEntry {
                material: "PLA".into(),
                subtype: "Matte".into(),
                color: "Black".into(),
                uid: "1".into(),
                json_path: "x".into(),
            },
            TagEntry {
                material: "PLA".into(),
                subtype: "Basic".into(),
                color: "White".into(),
                uid: "2".into(),
                json_path: "y".into(),
            },
        ];
        let index = material_index(&entries);
        assert_eq!(index["PLA"], vec!["Basic".to_string(), "Matte".to_string()]);
    }

    #[test]
    fn dump_to_blocks_rejects_short_hex() {
        let dump: Value = serde_json::json!({ "blocks": { "0": "DEADBEEF" } });
        assert!(dump_to_blocks(&dump).is_err());
    }

    #[test]
    fn s10_missing_keys_become_zero_blocks() {
        let mut hex = String::from("DEADBEEF");
        hex.push_str(&"00".repeat(12));
        let dump: Value = serde_json::json!({ "blocks": { "0": hex } });
        let blocks = dump_to_blocks(&dump).unwrap();
        assert_eq!(blocks.len(), TOTAL_BLOCKS);
        assert_eq!(&blocks[0][0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(blocks[1], [0u8; BYTES_PER_BLOCK]);
    }
}
