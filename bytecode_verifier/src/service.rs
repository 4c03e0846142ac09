// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared verification entry point.
//!
//! A [`VerifierService`] is shared by every thread that needs methods verified. It keeps a small
//! pool of processors per source language; each processor owns one [`TypeSystem`] and is used
//! by one thread at a time for one method, end to end. A thread that finds no free processor
//! and the pool at its limit spins until one is released.
//!
//! Each method carries a verification stage that any thread may read and write. Two threads may
//! verify the same method concurrently; both compute the same outcome and the last write wins.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use hashbrown::HashMap;

use crate::config::VerifierConfig;
use crate::job::{self, VerifyReport};
use crate::program::{ClassId, MethodId, Program, SourceLang};
use crate::type_system::TypeSystem;

/// How [`VerifierService::verify`] treats a request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VerificationMode {
    /// Every method is accepted without being checked.
    Disabled,
    /// Methods are verified the first time they are requested.
    #[default]
    OnDemand,
    /// Like [`VerificationMode::OnDemand`], also honoring the [`DebugConfig`] knobs.
    ///
    /// [`DebugConfig`]: crate::config::DebugConfig
    Debug,
}

/// Outcome of a verification request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// The method may be executed.
    Ok,
    /// The method must not be executed.
    Failed,
}

impl Status {
    fn from_ok(ok: bool) -> Self {
        if ok { Self::Ok } else { Self::Failed }
    }
}

/// Verification stage of a method.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    /// Not verified yet.
    NotVerified = 0,
    /// Verified, may be executed.
    VerifiedOk = 1,
    /// Verified, must not be executed.
    VerifiedFail = 2,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::VerifiedOk,
            2 => Self::VerifiedFail,
            _ => Self::NotVerified,
        }
    }
}

/// Persistent outcomes, keyed by [`Program::method_uid`].
///
/// The service consults the cache before verifying a method and records the outcome afterwards.
/// Implementations synchronize internally.
pub trait ResultCache: Send + Sync {
    /// Returns the recorded outcome of `uid`, or `None` if it is unknown.
    fn check(&self, uid: u64) -> Option<Status>;

    /// Records the outcome of `uid`.
    fn cache_result(&self, uid: u64, ok: bool);
}

/// A [`ResultCache`] that lives as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    results: spin::Mutex<HashMap<u64, bool>>,
}

impl InMemoryResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryResultCache {
    fn check(&self, uid: u64) -> Option<Status> {
        self.results.lock().get(&uid).copied().map(Status::from_ok)
    }

    fn cache_result(&self, uid: u64, ok: bool) {
        self.results.lock().insert(uid, ok);
    }
}

#[derive(Default)]
struct Pool {
    free: Vec<TypeSystem>,
    created: usize,
}

/// Returns a processor slot to its pool if the lease is abandoned by a panic.
struct Forfeit<'p> {
    pools: &'p spin::Mutex<HashMap<SourceLang, Pool>>,
    lang: SourceLang,
    armed: bool,
}

impl Drop for Forfeit<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Some(pool) = self.pools.lock().get_mut(&self.lang)
        {
            pool.created = pool.created.saturating_sub(1);
        }
    }
}

/// Verifies methods of one [`Program`] on behalf of any number of threads.
pub struct VerifierService {
    program: Arc<Program>,
    config: VerifierConfig,
    cache: Option<Arc<dyn ResultCache>>,
    pools: spin::Mutex<HashMap<SourceLang, Pool>>,
    stages: Vec<AtomicU8>,
    erroneous: Vec<AtomicBool>,
}

impl core::fmt::Debug for VerifierService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VerifierService")
            .field("methods", &self.stages.len())
            .field("classes", &self.erroneous.len())
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl VerifierService {
    /// Creates a service for `program`.
    #[must_use]
    pub fn new(program: Arc<Program>, config: VerifierConfig) -> Self {
        let stages = program.methods().iter().map(|_| AtomicU8::new(0)).collect();
        let erroneous = program
            .classes()
            .iter()
            .map(|_| AtomicBool::new(false))
            .collect();
        Self {
            program,
            config,
            cache: None,
            pools: spin::Mutex::new(HashMap::new()),
            stages,
            erroneous,
        }
    }

    /// Consults and updates `cache` around every verification.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The verified program.
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Current stage of `method`.
    #[must_use]
    pub fn stage(&self, method: MethodId) -> Stage {
        self.stages
            .get(method.0 as usize)
            .map_or(Stage::NotVerified, |s| Stage::from_u8(s.load(Ordering::Acquire)))
    }

    fn set_stage(&self, method: MethodId, ok: bool) {
        let stage = if ok {
            Stage::VerifiedOk
        } else {
            Stage::VerifiedFail
        };
        if let Some(s) = self.stages.get(method.0 as usize) {
            s.store(stage as u8, Ordering::Release);
        }
    }

    /// Decides whether `method` may be executed.
    ///
    /// Intrinsics and methods without code are accepted without being checked. A method is
    /// verified at most once per service unless two threads race on it.
    pub fn verify(&self, method: MethodId, mode: VerificationMode) -> Status {
        if mode == VerificationMode::Disabled {
            return Status::Ok;
        }
        match self.stage(method) {
            Stage::VerifiedOk => return Status::Ok,
            Stage::VerifiedFail => return Status::Failed,
            Stage::NotVerified => {}
        }
        let Some(def) = self.program.method(method) else {
            log::warn!("verify: no method with id {}", method.0);
            return Status::Failed;
        };
        if def.is_intrinsic() || def.code.is_none() {
            self.set_stage(method, true);
            return Status::Ok;
        }

        let debug = mode == VerificationMode::Debug;
        let name = self.program.method_full_name(method);
        if debug && self.config.skips_method(&name) {
            log::info!("{name}: skipped by configuration");
            self.set_stage(method, true);
            return Status::Ok;
        }

        let uid = self.program.method_uid(method);
        if let Some(status) = self.cache.as_deref().and_then(|c| c.check(uid)) {
            log::debug!("{name}: cached result {status:?}");
            self.set_stage(method, status == Status::Ok);
            return status;
        }

        let report = self.run(method, def.lang, debug);
        let ok = report.is_ok();
        if let Some(cache) = &self.cache {
            cache.cache_result(uid, ok);
        }
        self.set_stage(method, ok);
        if !ok {
            log::info!("{name}: verification failed");
        }
        Status::from_ok(ok)
    }

    /// Verifies `method` on a pooled processor and returns the full report.
    ///
    /// Bypasses the stage and the result cache and does not update them.
    pub fn report(&self, method: MethodId, mode: VerificationMode) -> VerifyReport {
        let lang = self
            .program
            .method(method)
            .map(|m| m.lang)
            .unwrap_or_default();
        self.run(method, lang, mode == VerificationMode::Debug)
    }

    /// Verifies every method declared by `class` and marks the class erroneous if any fails.
    pub fn verify_class(&self, class: ClassId, mode: VerificationMode) -> Status {
        let mut status = Status::Ok;
        for method in self.program.method_ids() {
            let declared_here = self
                .program
                .method(method)
                .is_some_and(|m| m.class == class);
            if declared_here && self.verify(method, mode) == Status::Failed {
                status = Status::Failed;
            }
        }
        if status == Status::Failed
            && let Some(flag) = self.erroneous.get(class.0 as usize)
        {
            flag.store(true, Ordering::Release);
        }
        status
    }

    /// Returns `true` if a method of `class` failed verification during [`Self::verify_class`].
    #[must_use]
    pub fn is_class_erroneous(&self, class: ClassId) -> bool {
        self.erroneous
            .get(class.0 as usize)
            .is_some_and(|f| f.load(Ordering::Acquire))
    }

    fn run(&self, method: MethodId, lang: SourceLang, debug: bool) -> VerifyReport {
        let mut ts = self.acquire(lang);
        let mut forfeit = Forfeit {
            pools: &self.pools,
            lang,
            armed: true,
        };
        let report = job::run(&mut ts, method, &self.config, debug, None);
        forfeit.armed = false;
        self.release(lang, ts);
        report
    }

    fn acquire(&self, lang: SourceLang) -> TypeSystem {
        let limit = self.config.processors_per_lang.max(1);
        loop {
            {
                let mut pools = self.pools.lock();
                let pool = pools.entry(lang).or_default();
                if let Some(ts) = pool.free.pop() {
                    return ts;
                }
                if pool.created < limit {
                    pool.created += 1;
                    log::debug!("starting {lang} processor {}", pool.created);
                    return TypeSystem::new(self.program.clone(), lang);
                }
            }
            core::hint::spin_loop();
        }
    }

    fn release(&self, lang: SourceLang, ts: TypeSystem) {
        self.pools.lock().entry(lang).or_default().free.push(ts);
    }

    /// Number of processors started for `lang`.
    #[must_use]
    pub fn processors(&self, lang: SourceLang) -> usize {
        self.pools.lock().get(&lang).map_or(0, |p| p.created)
    }
}
