//! Writes the assets of modules that compiled

use crate::asset::Asset;
use crate::compiler::{Compiler, Plugin, RunState, RunTap};
use crate::error::Result;
use async_trait::async_trait;
use std::rc::Rc;

pub struct EmitPlugin;

impl Plugin for EmitPlugin {
    fn name(&self) -> &'static str {
        "emit"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.emit_assets.tap("emit", Rc::new(WriteAssets));
    }
}

struct WriteAssets;

#[async_trait(?Send)]
impl RunTap for WriteAssets {
    async fn run(&self, run: &RunState) -> Result<()> {
        if !run.options.write_assets {
            log::debug!("asset writing disabled");
            return Ok(());
        }

        let assets: Vec<Asset> = {
            let stats = run.stats.borrow();
            run.assets
                .borrow()
                .iter()
                .filter(|asset| !stats.is_failed(&asset.module))
                .cloned()
                .collect()
        };
        for asset in &assets {
            if let Some(parent) = asset.output_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&asset.output_path, &asset.content).await?;
            log::trace!("wrote {}", asset.output_path.display());
        }
        run.stats.borrow_mut().emitted_count = assets.len();
        log::info!(
            "emitted {} assets to {}",
            assets.len(),
            run.options.output_dir().display()
        );
        Ok(())
    }
}
