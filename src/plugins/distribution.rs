//! Runs every module's compilation concurrently during `make`

use crate::compilation::Compilation;
use crate::compiler::{Compiler, MakeTap, Plugin, RunState};
use crate::error::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::rc::Rc;

pub struct DistributionPlugin;

impl Plugin for DistributionPlugin {
    fn name(&self) -> &'static str {
        "distribution"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.make.tap("distribution", Rc::new(Distribute));
    }
}

struct Distribute;

#[async_trait(?Send)]
impl MakeTap for Distribute {
    /// A failing module never fails the run; its compilation already reported it.
    async fn make(&self, _run: &RunState, compilations: &[Compilation]) -> Result<()> {
        let results = join_all(compilations.iter().map(Compilation::compile)).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        log::debug!(
            "compiled {} modules, {} failed",
            compilations.len() - failed,
            failed
        );
        Ok(())
    }
}
