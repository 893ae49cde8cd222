// src/registry/catalog.rs
// The closed tool catalog: declarations, schemas, preset membership.
//
// Tool algorithms themselves are out of scope (spec §1 Non-goals); each
// entry here is only name + description + input schema + preset membership
// + the behavioral flags the dispatcher/handlers need (wide, streamable,
// operational, cross-repo).

use super::presets::Preset;
use serde_json::{json, Value};
use std::sync::LazyLock;

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub presets: &'static [Preset],
    /// Output size scales with repo size; tracked by wide-result metrics (C10).
    pub wide: bool,
    /// Registered with the streaming controller (C9); honors `stream: true`.
    pub streamable: bool,
    /// Factual/state tool; gets the `operational` envelope shortcut.
    pub operational: bool,
    /// Spans repositories; envelope is forced to `speculative` tier.
    pub cross_repo: bool,
}

/// Builds a plain JSON-schema object with string-typed `required` params and
/// an open `properties` map described by `(name, type, description)` triples.
/// Not every tool needs this generality, but it keeps 60 declarations terse
/// and uniform, matching how the teacher expresses ad hoc JSON payloads with
/// `serde_json::json!` rather than a bespoke struct per shape.
fn object_schema(required: &[&str], props: &[(&str, &str, &str)]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, ty, desc) in props {
        properties.insert(
            (*name).to_string(),
            json!({ "type": ty, "description": desc }),
        );
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

macro_rules! tool {
    ($name:expr, $desc:expr, $schema:expr, $presets:expr, wide: $wide:expr, stream: $stream:expr, op: $op:expr, cross: $cross:expr) => {
        Tool {
            name: $name,
            description: $desc,
            input_schema: $schema,
            presets: $presets,
            wide: $wide,
            streamable: $stream,
            operational: $op,
            cross_repo: $cross,
        }
    };
}

const CORE: &[Preset] = &[Preset::Core, Preset::Full];
const REVIEW: &[Preset] = &[Preset::Review, Preset::Full];
const REFACTOR: &[Preset] = &[Preset::Refactor, Preset::Full];
const FEDERATION: &[Preset] = &[Preset::Federation, Preset::Full];
const DOCS: &[Preset] = &[Preset::Docs, Preset::Full];
const OPS: &[Preset] = &[Preset::Ops, Preset::Full];
const CORE_AND_OPS: &[Preset] = &[Preset::Core, Preset::Ops, Preset::Full];

/// Declaration order is the registry's stable order (spec §4.4, P7).
pub static TOOLS: LazyLock<Vec<Tool>> = LazyLock::new(|| {
    vec![
        // ---- core ----
        tool!(
            "searchSymbols",
            "Search symbols by name or semantic query across the active repository.",
            object_schema(
                &["query"],
                &[
                    ("query", "string", "Search text"),
                    ("limit", "integer", "Maximum results to return"),
                ],
            ),
            CORE,
            wide: true, stream: true, op: false, cross: false
        ),
        tool!(
            "findReferences",
            "Find all references to a symbol by id or fully-qualified name.",
            object_schema(
                &["symbolId"],
                &[
                    ("symbolId", "string", "Symbol identifier"),
                    ("limit", "integer", "Maximum results to return"),
                ],
            ),
            CORE,
            wide: true, stream: true, op: false, cross: false
        ),
        tool!(
            "getCallGraph",
            "Return the call graph rooted at a symbol, up to a given depth.",
            object_schema(
                &["symbolId"],
                &[
                    ("symbolId", "string", "Symbol identifier"),
                    ("depth", "integer", "Traversal depth, clamped to [1, 10]"),
                ],
            ),
            CORE,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getSymbolInfo",
            "Fetch metadata (signature, doc comment, location) for one symbol.",
            object_schema(&["symbolId"], &[("symbolId", "string", "Symbol identifier")]),
            CORE,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "listFiles",
            "List indexed files under an optional path prefix.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            CORE,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getFileOutline",
            "Return the top-level symbol outline of a single file.",
            object_schema(&["path"], &[("path", "string", "Repository-relative file path")]),
            CORE,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "getDefinition",
            "Jump to the definition site of a symbol reference.",
            object_schema(&["symbolId"], &[("symbolId", "string", "Symbol identifier")]),
            CORE,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "status",
            "Report server status: active repo, engine cache occupancy, uptime.",
            object_schema(&[], &[]),
            CORE_AND_OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "doctor",
            "Run self-diagnostics against the active engine and configuration.",
            object_schema(&[], &[]),
            CORE_AND_OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "listRepos",
            "List known repositories and their load/active state.",
            object_schema(&[], &[]),
            CORE,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "switchRepo",
            "Switch the active repository by registry name.",
            object_schema(&["name"], &[("name", "string", "Registered repo name")]),
            CORE,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "getActiveRepo",
            "Return the currently active repository name and path.",
            object_schema(&[], &[]),
            CORE,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "expandToolset",
            "Expand the active preset once per session, emitting a tools/list_changed notification.",
            object_schema(
                &["preset", "reason"],
                &[
                    ("preset", "string", "Target preset name"),
                    ("reason", "string", "Justification, at least 10 characters"),
                ],
            ),
            CORE,
            wide: false, stream: false, op: true, cross: false
        ),
        // ---- review ----
        tool!(
            "analyzeImpact",
            "Assess the blast radius of changing a symbol or file.",
            object_schema(
                &["target"],
                &[
                    ("target", "string", "Symbol id or file path"),
                    ("depth", "integer", "Traversal depth, clamped to [1, 10]"),
                ],
            ),
            REVIEW,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "analyzeChange",
            "Classify and summarize a git diff between two refs.",
            object_schema(
                &["fromRef", "toRef"],
                &[
                    ("fromRef", "string", "Base ref"),
                    ("toRef", "string", "Target ref"),
                ],
            ),
            REVIEW,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "summarizePr",
            "Summarize a pull request's changes, risk, and review checklist.",
            object_schema(&["fromRef", "toRef"], &[
                ("fromRef", "string", "Base ref"),
                ("toRef", "string", "Target ref"),
            ]),
            REVIEW,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getHotspots",
            "Rank files by churn x complexity to surface review hotspots.",
            object_schema(&[], &[("limit", "integer", "Maximum results to return")]),
            REVIEW,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getOwnership",
            "Return the inferred owning author/team for a path.",
            object_schema(&["path"], &[("path", "string", "Repository-relative path")]),
            REVIEW,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "getComplexity",
            "Return cyclomatic/cognitive complexity for a symbol or file.",
            object_schema(&["target"], &[("target", "string", "Symbol id or file path")]),
            REVIEW,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "reviewChecklist",
            "Generate a risk-ordered review checklist for a change set.",
            object_schema(&["fromRef", "toRef"], &[
                ("fromRef", "string", "Base ref"),
                ("toRef", "string", "Target ref"),
            ]),
            REVIEW,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "getBlameSummary",
            "Summarize blame (recency, authorship) for a file.",
            object_schema(&["path"], &[("path", "string", "Repository-relative path")]),
            REVIEW,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "listDecisions",
            "List recorded architecture decisions.",
            object_schema(&[], &[("limit", "integer", "Maximum results to return")]),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "getDecision",
            "Fetch one architecture decision record by id.",
            object_schema(&["decisionId"], &[("decisionId", "string", "Decision id")]),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "createDecision",
            "Record a new architecture decision.",
            object_schema(
                &["title", "body"],
                &[
                    ("title", "string", "Decision title"),
                    ("body", "string", "Decision rationale"),
                ],
            ),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "updateDecision",
            "Update an existing architecture decision record.",
            object_schema(&["decisionId"], &[
                ("decisionId", "string", "Decision id"),
                ("body", "string", "Updated rationale"),
            ]),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "deleteDecision",
            "Delete an architecture decision record by id.",
            object_schema(&["decisionId"], &[("decisionId", "string", "Decision id")]),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "annotate",
            "Attach a free-form annotation to a symbol or file.",
            object_schema(&["target", "note"], &[
                ("target", "string", "Symbol id or file path"),
                ("note", "string", "Annotation text"),
            ]),
            REVIEW,
            wide: false, stream: false, op: true, cross: false
        ),
        // ---- refactor ----
        tool!(
            "findDeadCode",
            "Find symbols with no statically or telemetry-observed callers.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "suggestExtraction",
            "Suggest a function/module extraction for a code region.",
            object_schema(&["path"], &[("path", "string", "Repository-relative path")]),
            REFACTOR,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "renamePreview",
            "Preview the blast radius of renaming a symbol, without applying it.",
            object_schema(&["symbolId", "newName"], &[
                ("symbolId", "string", "Symbol identifier"),
                ("newName", "string", "Proposed new name"),
            ]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "findDuplicates",
            "Find near-duplicate code fragments across the repository.",
            object_schema(&[], &[("minLines", "integer", "Minimum fragment size to consider")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getDependents",
            "List modules/packages that depend on a given module.",
            object_schema(&["moduleId"], &[("moduleId", "string", "Module identifier")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getTypeHierarchy",
            "Return the supertype/subtype hierarchy for a type.",
            object_schema(&["typeId"], &[("typeId", "string", "Type identifier")]),
            REFACTOR,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "findImplementations",
            "Find all implementations of an interface or trait.",
            object_schema(&["typeId"], &[("typeId", "string", "Interface/trait identifier")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "findUsagesOfType",
            "Find all usages (fields, params, locals) of a given type.",
            object_schema(&["typeId"], &[("typeId", "string", "Type identifier")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getTestCoverageGaps",
            "List symbols without associated test coverage.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "listTodos",
            "List TODO/FIXME markers across the repository.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            REFACTOR,
            wide: true, stream: false, op: false, cross: false
        ),
        // ---- federation ----
        tool!(
            "federatedSearchSymbols",
            "Search symbols by name or semantic query across all federated repositories.",
            object_schema(&["query"], &[
                ("query", "string", "Search text"),
                ("limit", "integer", "Maximum results to return"),
            ]),
            FEDERATION,
            wide: true, stream: false, op: false, cross: true
        ),
        tool!(
            "federatedFindReferences",
            "Find references to a symbol across all federated repositories.",
            object_schema(&["symbolId"], &[("symbolId", "string", "Symbol identifier")]),
            FEDERATION,
            wide: true, stream: false, op: false, cross: true
        ),
        tool!(
            "federatedAnalyzeImpact",
            "Assess cross-repository blast radius of changing a symbol.",
            object_schema(&["target"], &[("target", "string", "Symbol id or file path")]),
            FEDERATION,
            wide: true, stream: false, op: false, cross: true
        ),
        tool!(
            "listFederatedRepos",
            "List all repositories known to the federation index.",
            object_schema(&[], &[]),
            FEDERATION,
            wide: false, stream: false, op: true, cross: true
        ),
        tool!(
            "addFederationMember",
            "Register a repository as a federation member.",
            object_schema(&["name", "path"], &[
                ("name", "string", "Repo name"),
                ("path", "string", "Filesystem path"),
            ]),
            FEDERATION,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "removeFederationMember",
            "Remove a repository from the federation index.",
            object_schema(&["name"], &[("name", "string", "Repo name")]),
            FEDERATION,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "federationStatus",
            "Report federation index health and member count.",
            object_schema(&[], &[]),
            FEDERATION,
            wide: false, stream: false, op: true, cross: false
        ),
        // ---- docs ----
        tool!(
            "searchDocs",
            "Search indexed documentation by query.",
            object_schema(&["query"], &[("query", "string", "Search text")]),
            DOCS,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getDocForSymbol",
            "Fetch the documentation page(s) associated with a symbol.",
            object_schema(&["symbolId"], &[("symbolId", "string", "Symbol identifier")]),
            DOCS,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "listDocGaps",
            "List public symbols lacking documentation.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            DOCS,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "generateDocStub",
            "Generate a documentation stub for an undocumented symbol.",
            object_schema(&["symbolId"], &[("symbolId", "string", "Symbol identifier")]),
            DOCS,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "getAdr",
            "Fetch an architecture decision record rendered as a doc page.",
            object_schema(&["decisionId"], &[("decisionId", "string", "Decision id")]),
            DOCS,
            wide: false, stream: false, op: false, cross: false
        ),
        tool!(
            "listRunbooks",
            "List operational runbooks indexed from documentation.",
            object_schema(&[], &[]),
            DOCS,
            wide: false, stream: false, op: false, cross: false
        ),
        // ---- ops ----
        tool!(
            "jobStatus",
            "Fetch the status of a background job by id.",
            object_schema(&["jobId"], &[("jobId", "string", "Job id")]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "listJobs",
            "List background jobs and their states.",
            object_schema(&[], &[]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "cancelJob",
            "Cancel a running background job by id.",
            object_schema(&["jobId"], &[("jobId", "string", "Job id")]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "scanSecrets",
            "Scan the active repository for likely leaked secrets.",
            object_schema(&[], &[("pathPrefix", "string", "Optional path prefix filter")]),
            OPS,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "listSecretFindings",
            "List previously recorded secret-scan findings.",
            object_schema(&[], &[]),
            OPS,
            wide: true, stream: false, op: false, cross: false
        ),
        tool!(
            "getMetricsSummary",
            "Return the wide-result metrics summary for this session.",
            object_schema(&[], &[]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "getFreshness",
            "Report how stale the active repo's index is relative to HEAD.",
            object_schema(&[], &[]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "reindexRepo",
            "Trigger a reindex of the active repository.",
            object_schema(&[], &[]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "getConfig",
            "Return the server's resolved session configuration.",
            object_schema(&[], &[]),
            OPS,
            wide: false, stream: false, op: true, cross: false
        ),
        tool!(
            "ping",
            "Liveness check; always returns immediately.",
            object_schema(&[], &[]),
            CORE_AND_OPS,
            wide: false, stream: false, op: true, cross: false
        ),
    ]
});
