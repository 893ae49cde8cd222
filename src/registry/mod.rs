// src/registry/mod.rs
// Tool registry & presets (C4, spec §4.4)

pub mod catalog;
pub mod presets;

pub use catalog::{Tool, TOOLS};
pub use presets::Preset;

use crate::error::CkbError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};

/// Stateless view over the compiled-in catalog. Construction is free; all
/// instances share the same static `TOOLS` slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolRegistry;

impl ToolRegistry {
    /// All declared tools (the superset), in declaration order.
    pub fn get_definitions(&self) -> &'static [Tool] {
        &TOOLS
    }

    /// Tools exposed under `preset`, in declaration order (spec P7).
    pub fn get_filtered_tools(&self, preset: Preset) -> Vec<&'static Tool> {
        TOOLS
            .iter()
            .filter(|t| t.presets.contains(&preset))
            .collect()
    }

    /// Bytes-of-JSON / 4, a crude but stable token estimate (spec §4.4).
    pub fn estimate_tokens(&self, tools: &[&Tool]) -> usize {
        let bytes: usize = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
                .to_string()
                .len()
            })
            .sum();
        bytes / 4
    }

    /// Stable hash over an exposed toolset, used for client cache coherence
    /// (spec §4.4: `toolsetHash`).
    pub fn toolset_hash(&self, tools: &[&Tool]) -> String {
        let mut hasher = Sha256::new();
        for t in tools {
            hasher.update(t.name.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn find(&self, name: &str) -> Option<&'static Tool> {
        TOOLS.iter().find(|t| t.name == name)
    }
}

/// One page of a `tools/list` response (spec §4.4).
#[derive(Debug, Serialize)]
pub struct ToolPage {
    pub tools: Vec<ToolDescriptor>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<usize>,
    #[serde(rename = "toolsetHash")]
    pub toolset_hash: String,
}

#[derive(Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl From<&Tool> for ToolDescriptor {
    fn from(t: &Tool) -> Self {
        ToolDescriptor {
            name: t.name.to_string(),
            description: t.description.to_string(),
            input_schema: t.input_schema.clone(),
        }
    }
}

/// Page `tools` starting at `offset`, taking `page_size` entries (`<= 0`
/// means "all remaining"). `toolset_hash` must match the caller-supplied
/// hash of the full filtered set, else the client is out of sync and must
/// refetch from offset 0 (spec §4.4, P9).
pub fn paginate_tools(
    tools: &[&'static Tool],
    offset: usize,
    page_size: i64,
    current_hash: &str,
    supplied_hash: Option<&str>,
) -> Result<ToolPage, CkbError> {
    if let Some(supplied) = supplied_hash {
        if supplied != current_hash {
            return Err(CkbError::InvalidParams(
                "toolsetHash is stale; refetch from offset 0".to_string(),
            ));
        }
    }
    if offset > tools.len() {
        return Err(CkbError::InvalidParams(format!(
            "offset {offset} out of range [0, {}]",
            tools.len()
        )));
    }

    let take = if page_size <= 0 {
        tools.len() - offset
    } else {
        (page_size as usize).min(tools.len() - offset)
    };
    let page_end = offset + take;
    let next_cursor = (page_end < tools.len()).then_some(page_end);

    Ok(ToolPage {
        tools: tools[offset..page_end].iter().map(|t| ToolDescriptor::from(**t)).collect(),
        next_cursor,
        toolset_hash: current_hash.to_string(),
    })
}

/// Per-session preset state: the active preset plus the one-shot expansion
/// flag (spec §3 invariants: "expansion is a one-shot transition").
#[derive(Debug)]
pub struct PresetState {
    active: std::sync::Mutex<Preset>,
    expanded: AtomicBool,
}

impl PresetState {
    pub fn new(initial: Preset) -> Self {
        Self {
            active: std::sync::Mutex::new(initial),
            expanded: AtomicBool::new(false),
        }
    }

    pub fn active(&self) -> Preset {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::SeqCst)
    }

    /// Switch the active preset directly (used by session config, not the
    /// client-facing `expandToolset` tool which also applies the one-shot
    /// rule).
    pub fn set(&self, preset: Preset) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = preset;
    }

    /// Attempt the one-shot expansion. Returns `true` iff this call performed
    /// the transition; `false` if a prior call already consumed it (spec P6).
    pub fn try_expand(&self, target: Preset) -> bool {
        match self
            .expanded
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                self.set(target);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_concatenates_to_full_list() {
        let registry = ToolRegistry;
        let tools = registry.get_filtered_tools(Preset::Full);
        let hash = registry.toolset_hash(&tools);

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = paginate_tools(&tools, offset, 7, &hash, Some(&hash)).unwrap();
            let len = page.tools.len();
            seen.extend(page.tools.into_iter().map(|t| t.name));
            match page.next_cursor {
                Some(next) => offset = next,
                None => break,
            }
            assert!(len > 0);
        }
        let expected: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn stale_hash_rejected() {
        let registry = ToolRegistry;
        let tools = registry.get_filtered_tools(Preset::Core);
        let hash = registry.toolset_hash(&tools);
        let err = paginate_tools(&tools, 0, 5, &hash, Some("stale")).unwrap_err();
        assert!(matches!(err, CkbError::InvalidParams(_)));
    }

    #[test]
    fn out_of_range_offset_rejected() {
        let registry = ToolRegistry;
        let tools = registry.get_filtered_tools(Preset::Core);
        let hash = registry.toolset_hash(&tools);
        let err = paginate_tools(&tools, tools.len() + 1, 5, &hash, None).unwrap_err();
        assert!(matches!(err, CkbError::InvalidParams(_)));
    }

    #[test]
    fn page_size_non_positive_means_all_remaining() {
        let registry = ToolRegistry;
        let tools = registry.get_filtered_tools(Preset::Core);
        let hash = registry.toolset_hash(&tools);
        let page = paginate_tools(&tools, 0, 0, &hash, None).unwrap();
        assert_eq!(page.tools.len(), tools.len());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn expansion_is_one_shot() {
        let state = PresetState::new(Preset::Core);
        assert!(state.try_expand(Preset::Review));
        assert_eq!(state.active(), Preset::Review);
        assert!(!state.try_expand(Preset::Full));
        assert_eq!(state.active(), Preset::Review);
    }

    #[test]
    fn filtered_tools_follow_declaration_order() {
        let registry = ToolRegistry;
        let core = registry.get_filtered_tools(Preset::Core);
        let all_names: Vec<&str> = TOOLS.iter().filter(|t| t.presets.contains(&Preset::Core)).map(|t| t.name).collect();
        let filtered_names: Vec<&str> = core.iter().map(|t| t.name).collect();
        assert_eq!(filtered_names, all_names);
    }
}
