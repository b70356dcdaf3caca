//! Named declarative kernel-selection plans (C12).
//!
//! A [`KernelPath`] describes, per decode/prefill/pre-layer/post-layer/
//! sampling section, which concrete kernel each step should prefer. The
//! active path is process-wide but source-tagged (§3): a path installed by
//! `setActivePath` only replaces the current one when its source outranks
//! the one already active, mirroring the teacher's layered-config-override
//! pattern (`RuntimeConfig::load_from_toml` falling back to defaults) but
//! applied to which source gets the final say rather than which fields are
//! present.

use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelPathStep {
    pub op: String,
    pub kernel: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub weights: Option<Vec<String>>,
    #[serde(default)]
    pub constants: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelPathSteps {
    pub steps: Vec<KernelPathStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerOverride {
    pub layers: Vec<usize>,
    pub steps: Vec<KernelPathStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelPath {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub decode: KernelPathSteps,
    #[serde(default, rename = "prefill")]
    pub prefill: Option<KernelPathSteps>,
    #[serde(default, rename = "preLayer")]
    pub pre_layer: Option<Vec<KernelPathStep>>,
    #[serde(default, rename = "postLayer")]
    pub post_layer: Option<Vec<KernelPathStep>>,
    #[serde(default)]
    pub sampling: Option<Vec<KernelPathStep>>,
    #[serde(default, rename = "layerOverrides")]
    pub layer_overrides: Option<Vec<LayerOverride>>,
}

impl KernelPath {
    pub fn from_json(text: &str) -> KernelResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Looks up the variant a step registered for `role`/`op`, honoring any
    /// `layerOverrides` entry for `layer_idx` first. Role matching treats a
    /// `weights` entry containing regex metacharacters as a pattern (so a
    /// manifest can write `"ffn_(up|down)_proj"` to cover both legs of an
    /// MLP in one step) and everything else as a literal.
    pub fn variant_for(&self, phase: Phase, op: &str, role: &str, layer_idx: Option<usize>) -> Option<&str> {
        if let (Some(idx), Some(overrides)) = (layer_idx, &self.layer_overrides) {
            for over in overrides {
                if over.layers.contains(&idx) {
                    if let Some(step) = find_step(&over.steps, op, role) {
                        return Some(step.kernel.as_str());
                    }
                }
            }
        }

        let steps: &[KernelPathStep] = match phase {
            Phase::Decode => &self.decode.steps,
            Phase::Prefill => self
                .prefill
                .as_ref()
                .map(|p| p.steps.as_slice())
                .unwrap_or(&self.decode.steps),
            Phase::PreLayer => self.pre_layer.as_deref().unwrap_or(&[]),
            Phase::PostLayer => self.post_layer.as_deref().unwrap_or(&[]),
            Phase::Sampling => self.sampling.as_deref().unwrap_or(&[]),
        };
        find_step(steps, op, role).map(|step| step.kernel.as_str())
    }
}

fn find_step<'a>(steps: &'a [KernelPathStep], op: &str, role: &str) -> Option<&'a KernelPathStep> {
    steps.iter().find(|step| {
        if step.op != op {
            return false;
        }
        match &step.weights {
            None => true,
            Some(weights) => weights.iter().any(|w| role_matches(w, role)),
        }
    })
}

fn role_matches(pattern: &str, role: &str) -> bool {
    if pattern.contains(['(', ')', '|', '*', '[', ']']) {
        Regex::new(pattern).map(|re| re.is_match(role)).unwrap_or(false)
    } else {
        pattern == role
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Decode,
    Prefill,
    PreLayer,
    PostLayer,
    Sampling,
}

/// Where the active path came from, per §3: higher-priority sources win a
/// `set_active_path` call, and `manifest`/`profile`/`runtime` engage strict
/// validation in the selector (§4.8 step 1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KernelPathSource {
    None,
    Auto,
    Manifest,
    Profile,
    Runtime,
}

impl KernelPathSource {
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Manifest | Self::Profile | Self::Runtime)
    }
}

/// Caller-role aliases (§4.12): a role requested by a launcher may resolve
/// to one of several step names, tried in order until one is present for
/// the active phase. Roles outside the known table pass through unchanged.
fn role_aliases(role: &str) -> Vec<&str> {
    match role {
        "q_proj" => vec!["q_proj"],
        "k_proj" => vec!["k_proj"],
        "v_proj" => vec!["v_proj"],
        "qkv_proj" => vec!["qkv_proj", "q_proj"],
        "o_proj" => vec!["o_proj", "out_proj"],
        "ffn_up" => vec!["ffn_up", "up_proj"],
        "ffn_down" => vec!["ffn_down", "down_proj"],
        "ffn_gate" => vec!["ffn_gate", "gate_proj"],
        "lm_head" => vec!["lm_head", "embed_tokens"],
        other => vec![other],
    }
}

struct ActivePath {
    path: Arc<KernelPath>,
    source: KernelPathSource,
}

/// Process-wide resolver for the active kernel path plus the built-in
/// preset/alias table. Owned by [`crate::Engine`] rather than a module-level
/// global, per the redesign notes in spec §9.
pub struct KernelPathResolver {
    active: RwLock<Option<ActivePath>>,
    builtins: FxHashMap<&'static str, Arc<KernelPath>>,
}

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("q4k-fused", include_str!("../paths/q4k-fused.json")),
    ("q4k-dequant-f32", include_str!("../paths/q4k-dequant-f32.json")),
    ("q4k-dequant-f16", include_str!("../paths/q4k-dequant-f16.json")),
    ("f16-native", include_str!("../paths/f16-native.json")),
];

/// Semantic aliases (§3) resolved to a concrete built-in preset id.
fn resolve_alias(id: &str) -> &str {
    match id {
        "q4k-safe" => "q4k-dequant-f32",
        "q4k-fast" => "q4k-fused",
        "q4k-balanced" => "q4k-dequant-f16",
        other => other,
    }
}

impl KernelPathResolver {
    pub fn new() -> Self {
        let mut builtins = FxHashMap::default();
        for (id, text) in BUILTIN_SOURCES {
            match KernelPath::from_json(text) {
                Ok(path) => {
                    builtins.insert(*id, Arc::new(path));
                }
                Err(err) => {
                    log::error!("[KernelPathResolver] built-in preset `{id}` failed to parse: {err}");
                }
            }
        }
        Self {
            active: RwLock::new(None),
            builtins,
        }
    }

    /// Resolves an identifier (built-in name, semantic alias, or literal
    /// JSON) to a [`KernelPath`]. A literal is accepted whenever `id` starts
    /// with `{`.
    pub fn resolve(&self, id_or_literal: &str) -> KernelResult<Arc<KernelPath>> {
        if id_or_literal.trim_start().starts_with('{') {
            return Ok(Arc::new(KernelPath::from_json(id_or_literal)?));
        }
        let canonical = resolve_alias(id_or_literal);
        self.builtins
            .get(canonical)
            .cloned()
            .ok_or_else(|| KernelError::Context {
                context: "KernelPathResolver::resolve".to_string(),
                message: format!("unknown kernel path `{id_or_literal}`"),
            })
    }

    /// Installs `path` as the active path if `source` outranks (or equals,
    /// for re-installing the same-priority source) whatever is currently
    /// active.
    pub fn set_active_path(&self, path: Arc<KernelPath>, source: KernelPathSource) {
        let mut active = self.active.write();
        let should_install = match active.as_ref() {
            None => true,
            Some(current) => source >= current.source,
        };
        if should_install {
            log::info!("[KernelPathResolver] active path set to `{}` (source {:?})", path.id, source);
            *active = Some(ActivePath { path, source });
        } else {
            log::debug!(
                "[KernelPathResolver] ignoring lower-priority path `{}` (source {:?}, current {:?})",
                path.id,
                source,
                active.as_ref().map(|a| a.source)
            );
        }
    }

    pub fn clear_active_path(&self) {
        *self.active.write() = None;
    }

    pub fn active_source(&self) -> KernelPathSource {
        self.active
            .read()
            .as_ref()
            .map(|a| a.source)
            .unwrap_or(KernelPathSource::None)
    }

    pub fn is_strict(&self) -> bool {
        self.active_source().is_strict()
    }

    /// Per-op override lookup used by the selector (§4.8 step 1). Tries
    /// every alias for `role` in order; returns the first step match.
    pub fn override_for(&self, phase: Phase, op: &str, role: &str, layer_idx: Option<usize>) -> Option<String> {
        let active = self.active.read();
        let active = active.as_ref()?;
        for alias in role_aliases(role) {
            if let Some(kernel) = active.path.variant_for(phase, op, alias, layer_idx) {
                return Some(kernel.to_string());
            }
        }
        None
    }

    /// Per-layer steps for a whole phase, applying overrides: §4.12's
    /// `getLayerSteps(path, layerIdx, phase)`.
    pub fn layer_steps(&self, phase: Phase, layer_idx: usize) -> Vec<KernelPathStep> {
        let active = self.active.read();
        let Some(active) = active.as_ref() else {
            return Vec::new();
        };
        let base: &[KernelPathStep] = match phase {
            Phase::Decode => &active.path.decode.steps,
            Phase::Prefill => active
                .path
                .prefill
                .as_ref()
                .map(|p| p.steps.as_slice())
                .unwrap_or(&active.path.decode.steps),
            Phase::PreLayer => active.path.pre_layer.as_deref().unwrap_or(&[]),
            Phase::PostLayer => active.path.post_layer.as_deref().unwrap_or(&[]),
            Phase::Sampling => active.path.sampling.as_deref().unwrap_or(&[]),
        };

        let mut steps = base.to_vec();
        if let Some(overrides) = &active.path.layer_overrides {
            for over in overrides {
                if over.layers.contains(&layer_idx) {
                    for override_step in &over.steps {
                        if let Some(existing) = steps.iter_mut().find(|s| s.op == override_step.op) {
                            *existing = override_step.clone();
                        } else {
                            steps.push(override_step.clone());
                        }
                    }
                }
            }
        }
        steps
    }
}

impl Default for KernelPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_presets_all_parse() {
        let resolver = KernelPathResolver::new();
        assert_eq!(resolver.builtins.len(), BUILTIN_SOURCES.len());
    }

    #[test]
    fn semantic_alias_resolves_to_concrete_preset() {
        let resolver = KernelPathResolver::new();
        let path = resolver.resolve("q4k-fast").unwrap();
        assert_eq!(path.id, "q4k-fused");
    }

    #[test]
    fn higher_priority_source_overrides_lower() {
        let resolver = KernelPathResolver::new();
        let auto = resolver.resolve("q4k-dequant-f32").unwrap();
        let runtime = resolver.resolve("q4k-fused").unwrap();
        resolver.set_active_path(auto, KernelPathSource::Auto);
        resolver.set_active_path(runtime, KernelPathSource::Runtime);
        assert_eq!(resolver.active_source(), KernelPathSource::Runtime);
    }

    #[test]
    fn lower_priority_source_does_not_override_higher() {
        let resolver = KernelPathResolver::new();
        let manifest = resolver.resolve("q4k-fused").unwrap();
        let auto = resolver.resolve("q4k-dequant-f32").unwrap();
        resolver.set_active_path(manifest, KernelPathSource::Manifest);
        resolver.set_active_path(auto, KernelPathSource::Auto);
        assert_eq!(resolver.active_source(), KernelPathSource::Manifest);
    }

    #[test]
    fn override_for_resolves_role_alias() {
        let resolver = KernelPathResolver::new();
        let path = resolver.resolve("q4k-fused").unwrap();
        resolver.set_active_path(path, KernelPathSource::Runtime);
        let kernel = resolver.override_for(Phase::Decode, "matmul", "qkv_proj", None);
        assert_eq!(kernel.as_deref(), Some("q4_fused_multicol_f16"));
    }

    #[test]
    fn manifest_and_profile_and_runtime_sources_are_strict() {
        assert!(KernelPathSource::Manifest.is_strict());
        assert!(KernelPathSource::Profile.is_strict());
        assert!(KernelPathSource::Runtime.is_strict());
        assert!(!KernelPathSource::Auto.is_strict());
        assert!(!KernelPathSource::None.is_strict());
    }
}
