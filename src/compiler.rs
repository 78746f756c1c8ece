//! Stage compiler
//!
//! Turns the abstract stages of a workflow into concrete COLMAP invocations.
//! Each stage name maps to an ordered list of injection rules which add the
//! path parameters COLMAP needs (database, images, sparse/dense folders).
//! Stages missing from the table get their explicit parameters only.
//!
//! Compilation is pure: it reads no files and creates nothing.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::context::ExecutionContext;
use crate::workflow::{StageParams, StageSpec, Workflow};

/// A path parameter derived from the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionRule {
    /// `database_path = <out>/database/database.db`
    Database,
    /// `image_path = <images>`
    Images,
    /// `workspace_path = <out>/dense`
    DenseWorkspace,
    /// `output_path = <out>/sparse`
    SparseOutput,
    /// `input_path = output_path = <out>/sparse/0`
    RefineSparseModel,
    /// `output_path = <out>/dense`, `input_path = <out>/sparse/0`
    Undistort,
    /// `output_path = <out>/dense/fused.ply`
    FusionOutput,
    /// `input_path = <out>/dense/fused.ply`
    MeshFromFusedCloud,
    /// `input_path = <out>/dense`
    MeshFromDenseWorkspace,
    /// `output_path = <out>/dense/<folder>/mesh.ply`
    MeshOutput(&'static str),
    /// `VocabTreeMatching.vocab_tree_path`, unless set explicitly
    VocabTree,
    /// `match_list_path`, unless set explicitly
    MatchList,
}

use InjectionRule::*;

/// Stage name -> injection rules, applied in order
pub const STAGE_RULES: &[(&str, &[InjectionRule])] = &[
    ("feature_extractor", &[Database, Images]),
    ("exhaustive_matcher", &[Database]),
    ("sequential_matcher", &[Database]),
    ("spatial_matcher", &[Database]),
    ("transitive_matcher", &[Database]),
    ("vocab_tree_matcher", &[Database, VocabTree]),
    ("matches_importer", &[Database, MatchList]),
    ("mapper", &[Database, Images, SparseOutput]),
    ("hierarchical_mapper", &[Database, Images, SparseOutput]),
    ("model_aligner", &[RefineSparseModel]),
    ("bundle_adjuster", &[RefineSparseModel]),
    ("image_undistorter", &[Images, Undistort]),
    ("patch_match_stereo", &[DenseWorkspace]),
    ("stereo_fusion", &[DenseWorkspace, FusionOutput]),
    ("poisson_mesher", &[MeshFromFusedCloud, MeshOutput("poisson")]),
    ("delaunay_mesher", &[MeshFromDenseWorkspace, MeshOutput("delaunay")]),
];

static RULE_INDEX: Lazy<HashMap<&'static str, &'static [InjectionRule]>> =
    Lazy::new(|| STAGE_RULES.iter().copied().collect());

/// Injection rules registered for `stage` (empty for unknown stages)
pub fn rules_for(stage: &str) -> &'static [InjectionRule] {
    RULE_INDEX.get(stage).copied().unwrap_or(&[])
}

impl InjectionRule {
    /// Apply the rule to `params`. Returns a folder that must exist before
    /// the stage runs, if any.
    fn apply(self, params: &mut StageParams, ctx: &ExecutionContext) -> Option<PathBuf> {
        match self {
            Database => params.set("database_path", path_str(ctx.database_path())),
            Images => params.set("image_path", path_str(ctx.image_path())),
            DenseWorkspace => params.set("workspace_path", path_str(&ctx.dense_dir())),
            SparseOutput => params.set("output_path", path_str(&ctx.sparse_dir())),
            RefineSparseModel => {
                let model = path_str(&ctx.sparse_model());
                params.set("input_path", model.clone());
                params.set("output_path", model);
            }
            Undistort => {
                params.set("output_path", path_str(&ctx.dense_dir()));
                params.set("input_path", path_str(&ctx.sparse_model()));
            }
            FusionOutput => params.set("output_path", path_str(&ctx.fused_ply())),
            MeshFromFusedCloud => params.set("input_path", path_str(&ctx.fused_ply())),
            MeshFromDenseWorkspace => params.set("input_path", path_str(&ctx.dense_dir())),
            MeshOutput(folder) => {
                let dir = ctx.dense_dir().join(folder);
                params.set("output_path", path_str(&dir.join("mesh.ply")));
                return Some(dir);
            }
            VocabTree => {
                if !params.contains("VocabTreeMatching.vocab_tree_path") {
                    params.set(
                        "VocabTreeMatching.vocab_tree_path",
                        path_str(&ctx.assets().vocab_tree()),
                    );
                }
            }
            MatchList => {
                if !params.contains("match_list_path") {
                    params.set("match_list_path", path_str(&ctx.assets().match_list()));
                }
            }
        }
        None
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A stage resolved to a concrete process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCommand {
    pub stage: String,
    pub program: String,
    /// Flattened `--key value` pairs
    pub args: Vec<String>,
    /// Output folders the stage expects to exist
    pub ensure_dirs: Vec<PathBuf>,
}

impl CompiledCommand {
    /// `<program> <stage> --key value ...`, as recorded in the execution log
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        parts.push(self.program.as_str());
        parts.push(self.stage.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

impl fmt::Display for CompiledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Explicit parameters of `stage` with the implicit ones injected
pub fn inject(stage: &StageSpec, ctx: &ExecutionContext) -> (StageParams, Vec<PathBuf>) {
    let mut params = stage.params.clone();
    let ensure_dirs = rules_for(&stage.name)
        .iter()
        .filter_map(|rule| rule.apply(&mut params, ctx))
        .collect();
    (params, ensure_dirs)
}

/// Compile one stage
pub fn compile_stage(stage: &StageSpec, ctx: &ExecutionContext, tool_path: &str) -> CompiledCommand {
    let (params, ensure_dirs) = inject(stage, ctx);
    let args = params
        .iter()
        .flat_map(|(key, value)| [format!("--{}", key), value.to_string()])
        .collect();

    CompiledCommand {
        stage: stage.name.clone(),
        program: tool_path.to_string(),
        args,
        ensure_dirs,
    }
}

/// Compile every stage of `workflow`, in declared order
pub fn compile(workflow: &Workflow, ctx: &ExecutionContext, tool_path: &str) -> Vec<CompiledCommand> {
    workflow
        .stages
        .iter()
        .map(|stage| compile_stage(stage, ctx, tool_path))
        .collect()
}
