//! Per-run statistics and the end-of-run summary

use crate::error::{CompilerError, ErrorKind};
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// A module whose compilation failed, with the stage it failed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFailure {
    pub module: String,
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// A non-fatal problem: a dropped dependency edge or a degraded config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub module: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(module: Option<&str>, error: &CompilerError) -> Self {
        Self {
            module: module.map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerStats {
    pub module_count: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<ModuleFailure>,
    pub diagnostics: Vec<Diagnostic>,
    /// Assets produced by modules that compiled.
    pub asset_count: usize,
    /// Assets written to disk.
    pub emitted_count: usize,
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub started_at: Option<Instant>,
}

impl CompilerStats {
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        if let Some(started_at) = self.started_at {
            self.elapsed_ms = started_at.elapsed().as_millis() as u64;
        }
    }

    pub fn record_success(&mut self, module: &str) {
        if !self.succeeded.iter().any(|m| m == module) {
            self.succeeded.push(module.to_string());
        }
    }

    pub fn record_failure(&mut self, module: &str, stage: impl fmt::Display, error: &CompilerError) {
        self.failed.push(ModuleFailure {
            module: module.to_string(),
            stage: stage.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn is_failed(&self, module: &str) -> bool {
        self.failed.iter().any(|f| f.module == module)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Failed modules plus diagnostics.
    pub fn partial_failures(&self) -> usize {
        self.failed.len() + self.diagnostics.len()
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} modules: {} succeeded, {} failed, {} diagnostics, {} assets in {}ms",
            self.module_count,
            self.succeeded.len(),
            self.failed.len(),
            self.diagnostics.len(),
            self.asset_count,
            self.elapsed_ms
        )];
        if !self.succeeded.is_empty() {
            lines.push(format!("  succeeded: {}", self.succeeded.join(", ")));
        }
        for failure in &self.failed {
            lines.push(format!(
                "  failed: {} [{}] {}: {}",
                failure.module, failure.stage, failure.kind, failure.message
            ));
        }
        for diagnostic in &self.diagnostics {
            lines.push(format!(
                "  {}{}: {}",
                diagnostic
                    .module
                    .as_deref()
                    .map(|m| format!("{} ", m))
                    .unwrap_or_default(),
                diagnostic.kind,
                diagnostic.message
            ));
        }
        lines.join("\n")
    }
}
