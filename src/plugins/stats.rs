//! Run timing, per-module outcomes and the end-of-run summary

use crate::compilation::{Compilation, Stage};
use crate::compiler::{Compiler, Plugin, RunState, RunTap};
use crate::error::{CompilerError, Result};
use async_trait::async_trait;
use std::rc::Rc;

pub struct StatsPlugin;

impl Plugin for StatsPlugin {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn apply(&self, compiler: &mut Compiler) {
        let hooks = &mut compiler.hooks;
        hooks.initialize.tap("stats", Rc::new(StartTimer));
        hooks.compilation.tap(
            "stats",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks.complete.tap(
                    "stats",
                    Rc::new(|cx: &Compilation| cx.run.stats.borrow_mut().record_success(cx.name())),
                );
                cx.hooks.fail.tap(
                    "stats",
                    Rc::new(|cx: &Compilation, stage: Stage, err: &CompilerError| {
                        cx.run.stats.borrow_mut().record_failure(cx.name(), stage, err)
                    }),
                );
            }),
        );
        hooks
            .done
            .tap("stats", Rc::new(|run: &RunState| run.stats.borrow_mut().finish()));
        hooks.after_done.tap(
            "stats",
            Rc::new(|run: &RunState| {
                let stats = run.stats.borrow();
                if stats.has_failures() {
                    log::warn!("{}", stats.summary());
                } else {
                    log::info!("{}", stats.summary());
                }
            }),
        );
    }
}

struct StartTimer;

#[async_trait(?Send)]
impl RunTap for StartTimer {
    async fn run(&self, run: &RunState) -> Result<()> {
        run.stats.borrow_mut().start();
        Ok(())
    }
}
