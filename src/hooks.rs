//! Typed extension points for the compiler pipeline.
//!
//! Every hook holds an ordered list of named taps over one handler type `H` (usually a
//! `dyn Trait` or `dyn Fn`). Calling a hook takes a closure that invokes a single handler, so
//! the hook itself stays agnostic of the handler's arguments. Keyed hooks are expressed with
//! [`HookMap`], which always holds one hook per [`FileKind`].

use crate::error::{CompilerError, Result};
use crate::types::FileKind;
use futures::future::join_all;
use std::future::Future;
use std::rc::Rc;

/// A named handler registered on a hook.
pub struct Tap<H: ?Sized> {
    pub name: String,
    pub handler: Rc<H>,
}

impl<H: ?Sized> Clone for Tap<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: Rc::clone(&self.handler),
        }
    }
}

macro_rules! define_hook {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<H: ?Sized> {
            taps: Vec<Tap<H>>,
        }

        impl<H: ?Sized> $name<H> {
            pub fn new() -> Self {
                Self { taps: Vec::new() }
            }

            /// Registers a handler. Handlers run in registration order.
            pub fn tap(&mut self, name: impl Into<String>, handler: Rc<H>) {
                self.taps.push(Tap {
                    name: name.into(),
                    handler,
                });
            }

            pub fn is_used(&self) -> bool {
                !self.taps.is_empty()
            }

            pub fn tap_names(&self) -> Vec<&str> {
                self.taps.iter().map(|tap| tap.name.as_str()).collect()
            }
        }

        impl<H: ?Sized> Default for $name<H> {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

define_hook!(
    /// Runs every handler in order, discarding results.
    SyncHook
);
define_hook!(
    /// Runs handlers in order until one returns `Some`.
    SyncBailHook
);
define_hook!(
    /// Threads a value through every handler in order.
    SyncWaterfallHook
);
define_hook!(
    /// Awaits handlers one after another; the first error aborts the rest.
    AsyncSeriesHook
);
define_hook!(
    /// Starts every handler concurrently and joins them. Failures do not cancel siblings.
    AsyncParallelHook
);
define_hook!(
    /// Awaits handlers one after another until one yields `Some`.
    AsyncSeriesBailHook
);
define_hook!(
    /// Threads a value through every handler, awaiting each stage.
    AsyncSeriesWaterfallHook
);

impl<H: ?Sized> SyncHook<H> {
    pub fn call(&self, mut f: impl FnMut(&H)) {
        for tap in &self.taps {
            f(&*tap.handler);
        }
    }
}

impl<H: ?Sized> SyncBailHook<H> {
    pub fn call<R>(&self, mut f: impl FnMut(&H) -> Option<R>) -> Option<R> {
        for tap in &self.taps {
            if let Some(result) = f(&*tap.handler) {
                log::trace!("hook bailed at tap '{}'", tap.name);
                return Some(result);
            }
        }
        None
    }
}

impl<H: ?Sized> SyncWaterfallHook<H> {
    pub fn call<V>(&self, init: V, mut f: impl FnMut(&H, V) -> V) -> V {
        self.taps
            .iter()
            .fold(init, |value, tap| f(&*tap.handler, value))
    }
}

impl<H: ?Sized> AsyncSeriesHook<H> {
    pub async fn call<'h, F, Fut>(&'h self, mut f: F) -> Result<()>
    where
        F: FnMut(&'h H) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for tap in &self.taps {
            if let Err(err) = f(&*tap.handler).await {
                log::debug!("tap '{}' failed: {}", tap.name, err);
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<H: ?Sized> AsyncParallelHook<H> {
    pub async fn call<'h, F, Fut>(&'h self, mut f: F) -> Result<()>
    where
        F: FnMut(&'h H) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let results = join_all(self.taps.iter().map(|tap| f(&*tap.handler))).await;

        let mut errors = Vec::new();
        for (tap, result) in self.taps.iter().zip(results) {
            if let Err(err) = result {
                log::debug!("tap '{}' failed: {}", tap.name, err);
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CompilerError::aggregate(errors))
        }
    }
}

impl<H: ?Sized> AsyncSeriesBailHook<H> {
    pub async fn call<'h, R, F, Fut>(&'h self, mut f: F) -> Result<Option<R>>
    where
        F: FnMut(&'h H) -> Fut,
        Fut: Future<Output = Result<Option<R>>>,
    {
        for tap in &self.taps {
            if let Some(result) = f(&*tap.handler).await? {
                log::trace!("hook bailed at tap '{}'", tap.name);
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}

impl<H: ?Sized> AsyncSeriesWaterfallHook<H> {
    pub async fn call<'h, V, F, Fut>(&'h self, init: V, mut f: F) -> Result<V>
    where
        F: FnMut(&'h H, V) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut value = init;
        for tap in &self.taps {
            value = f(&*tap.handler, value).await?;
        }
        Ok(value)
    }
}

/// One independent hook per file kind.
pub struct HookMap<T> {
    hooks: [T; 4],
}

impl<T: Default> HookMap<T> {
    pub fn new() -> Self {
        Self {
            hooks: std::array::from_fn(|_| T::default()),
        }
    }
}

impl<T: Default> Default for HookMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HookMap<T> {
    pub fn get(&self, kind: FileKind) -> &T {
        &self.hooks[kind.index()]
    }

    pub fn for_kind(&mut self, kind: FileKind) -> &mut T {
        &mut self.hooks[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Step = dyn Fn(i32) -> i32;

    #[test]
    fn test_sync_hook_runs_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hook: SyncHook<dyn Fn(&str)> = SyncHook::new();
        for name in ["first", "second"] {
            let seen = Rc::clone(&seen);
            hook.tap(name, Rc::new(move |arg: &str| seen.borrow_mut().push(format!("{}:{}", name, arg))));
        }
        hook.call(|h| h("x"));
        assert_eq!(*seen.borrow(), vec!["first:x", "second:x"]);
        assert_eq!(hook.tap_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_bail_stops_at_first_some() {
        let calls = Rc::new(RefCell::new(0));
        let mut hook: SyncBailHook<dyn Fn(i32) -> Option<i32>> = SyncBailHook::new();
        hook.tap("none", Rc::new(|_: i32| -> Option<i32> { None }));
        hook.tap("double", Rc::new(|v: i32| Some(v * 2)));
        let counter = Rc::clone(&calls);
        hook.tap(
            "never",
            Rc::new(move |_: i32| {
                *counter.borrow_mut() += 1;
                Some(0)
            }),
        );
        assert_eq!(hook.call(|h| h(21)), Some(42));
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_empty_hooks_yield_identity() {
        let bail: SyncBailHook<dyn Fn(i32) -> Option<i32>> = SyncBailHook::new();
        assert_eq!(bail.call(|h| h(1)), None);

        let waterfall: SyncWaterfallHook<Step> = SyncWaterfallHook::new();
        assert_eq!(waterfall.call(7, |h, v| h(v)), 7);
        assert!(!waterfall.is_used());
    }

    #[test]
    fn test_waterfall_threads_value() {
        let mut hook: SyncWaterfallHook<Step> = SyncWaterfallHook::new();
        hook.tap("add", Rc::new(|v: i32| v + 1));
        hook.tap("mul", Rc::new(|v: i32| v * 10));
        assert_eq!(hook.call(1, |h, v| h(v)), 20);
    }

    #[tokio::test]
    async fn test_async_series_aborts_on_error() {
        let ran = Rc::new(RefCell::new(Vec::new()));
        let mut hook: AsyncSeriesHook<dyn Fn() -> Result<()>> = AsyncSeriesHook::new();
        let sink = Rc::clone(&ran);
        hook.tap("ok", Rc::new(move || -> Result<()> {
            sink.borrow_mut().push("ok");
            Ok(())
        }));
        hook.tap("fail", Rc::new(|| -> Result<()> { Err(CompilerError::transform("x", "boom")) }));
        let sink = Rc::clone(&ran);
        hook.tap("after", Rc::new(move || -> Result<()> {
            sink.borrow_mut().push("after");
            Ok(())
        }));

        let result = hook.call(|h| async move { h() }).await;
        assert!(result.is_err());
        assert_eq!(*ran.borrow(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_async_parallel_runs_all_and_aggregates() {
        let ran = Rc::new(RefCell::new(0));
        let mut hook: AsyncParallelHook<dyn Fn() -> Result<()>> = AsyncParallelHook::new();
        hook.tap("a", Rc::new(|| -> Result<()> { Err(CompilerError::transform("a", "first")) }));
        let counter = Rc::clone(&ran);
        hook.tap("b", Rc::new(move || -> Result<()> {
            *counter.borrow_mut() += 1;
            Ok(())
        }));
        hook.tap("c", Rc::new(|| -> Result<()> { Err(CompilerError::transform("c", "second")) }));

        let err = hook.call(|h| async move { h() }).await.unwrap_err();
        assert_eq!(*ran.borrow(), 1);
        match err {
            CompilerError::Aggregate(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregate, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_async_bail_and_waterfall() {
        let mut bail: AsyncSeriesBailHook<dyn Fn(&str) -> Option<String>> = AsyncSeriesBailHook::new();
        bail.tap("skip", Rc::new(|_: &str| -> Option<String> { None }));
        bail.tap("hit", Rc::new(|p: &str| Some(format!("loaded {p}"))));
        let loaded = bail.call(|h| async move { Ok(h("a.js")) }).await.unwrap();
        assert_eq!(loaded.as_deref(), Some("loaded a.js"));

        let mut waterfall: AsyncSeriesWaterfallHook<Step> = AsyncSeriesWaterfallHook::new();
        waterfall.tap("inc", Rc::new(|v: i32| v + 1));
        waterfall.tap("inc", Rc::new(|v: i32| v + 1));
        let value = waterfall.call(0, |h, v| async move { Ok(h(v)) }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_hook_map_has_one_hook_per_kind() {
        let mut map: HookMap<SyncWaterfallHook<Step>> = HookMap::new();
        map.for_kind(FileKind::Style).tap("style", Rc::new(|v: i32| v + 100));
        assert_eq!(map.get(FileKind::Style).call(1, |h, v| h(v)), 101);
        assert_eq!(map.get(FileKind::Script).call(1, |h, v| h(v)), 1);
    }
}
