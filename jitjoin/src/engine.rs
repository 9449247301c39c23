//! JIT compilation engine: Cranelift infrastructure.
//!
//! `JitEngine` owns Cranelift's JIT module between `initialize` and
//! `shutdown`, compiles join IR to native code, and caches compiled
//! functions by the hash of their IR text.
//!
//! The runtime string-equality helper is registered as an external symbol
//! when the module is created; generated code calls it through Cranelift's
//! normal call mechanism. String constants used by the IR are copied into an
//! arena owned by the engine, and their addresses are baked into the code as
//! immediates, so they live exactly as long as the code pages.

use std::collections::HashMap;
use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cranelift_codegen::ir::types;
use cranelift_codegen::ir::{AbiParam, Signature, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use log::{debug, info, log_enabled, trace, Level};

use crate::backend::{state_error, BackendState, CompilationBackend, JoinEntry};
use crate::config::BackendConfig;
use crate::error::JitError;
use crate::ir::IrFunction;
use crate::join_ir::has_join_signature;
use crate::lower::{build_function_ir, clif_type, LowerEnv};
use crate::runtime::{self, STR_EQ_SYMBOL};

type JoinFnPtr = unsafe extern "C" fn(
    *const *const c_char,
    *const *const c_char,
    *mut *const c_char,
    i32,
    i32,
) -> i32;

/// A natively compiled join function.
pub struct NativeJoinFn {
    /// Signature: `fn(left, right, out, size, legacy) -> matches`.
    fn_ptr: *const u8,
    /// Cleared when the owning engine frees its code pages.
    live: Arc<AtomicBool>,
}

// Safety: the compiled code is immutable after finalization and keeps no
// thread-local state.
unsafe impl Send for NativeJoinFn {}
unsafe impl Sync for NativeJoinFn {}

impl NativeJoinFn {
    /// Get the raw function pointer (for benchmarking/introspection).
    pub fn as_fn_ptr(&self) -> *const u8 {
        self.fn_ptr
    }
}

impl JoinEntry for NativeJoinFn {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    unsafe fn call(
        &self,
        left: *const *const c_char,
        right: *const *const c_char,
        out: *mut *const c_char,
        size: i32,
        legacy: i32,
    ) -> i32 {
        let func: JoinFnPtr = std::mem::transmute(self.fn_ptr);
        func(left, right, out, size, legacy)
    }
}

/// The JIT compilation engine.
pub struct JitEngine {
    config: BackendConfig,
    state: BackendState,

    /// Cranelift JIT module; owns the compiled code pages.
    module: Option<JITModule>,

    /// Backing storage for string constants baked into compiled code.
    strings: Vec<CString>,

    /// Compiled function cache: IR hash → fn ptr.
    cache: HashMap<u64, *const u8>,

    live: Arc<AtomicBool>,
}

impl JitEngine {
    /// Create an engine in the `Uninitialized` state.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            state: BackendState::Uninitialized,
            module: None,
            strings: Vec::new(),
            cache: HashMap::new(),
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Get the number of cached functions.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn set_state(&mut self, next: BackendState) {
        debug!("jit backend: {} -> {}", self.state, next);
        self.state = next;
    }

    fn build_module(&self) -> Result<JITModule, JitError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", self.config.opt_level.as_setting())
            .map_err(|e| JitError::Init(e.to_string()))?;
        flag_builder
            .set(
                "enable_verifier",
                if self.config.verify { "true" } else { "false" },
            )
            .map_err(|e| JitError::Init(e.to_string()))?;

        let isa_builder = cranelift_codegen::isa::lookup(target_lexicon::Triple::host())
            .map_err(|e| JitError::Init(e.to_string()))?;

        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::Init(e.to_string()))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        builder.symbol(STR_EQ_SYMBOL, runtime::str_eq as *const u8);

        Ok(JITModule::new(builder))
    }

    /// Declare, lower, define and finalize `func` in `module`.
    fn emit(
        &mut self,
        module: &mut JITModule,
        func: &IrFunction,
        key: u64,
    ) -> Result<*const u8, JitError> {
        let symbol = format!("{}_{key:x}", func.name());
        let sig = join_signature(module, func);
        let func_id = module
            .declare_function(&symbol, Linkage::Local, &sig)
            .map_err(|e| JitError::Module(e.to_string()))?;
        self.set_state(BackendState::MethodRegistered);

        let str_eq_id = module
            .declare_function(STR_EQ_SYMBOL, Linkage::Import, &str_eq_signature(module))
            .map_err(|e| JitError::Module(e.to_string()))?;

        let string_addrs: Vec<i64> = func
            .strings()
            .iter()
            .map(|s| {
                let owned = s.clone();
                let addr = owned.as_ptr() as i64;
                self.strings.push(owned);
                addr
            })
            .collect();

        let mut ctx = module.make_context();
        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, func_id.as_u32());
        let str_eq = module.declare_func_in_func(str_eq_id, &mut ctx.func);

        let env = LowerEnv {
            ptr_type: module.target_config().pointer_type(),
            str_eq,
            string_addrs: &string_addrs,
        };
        build_function_ir(&mut ctx.func, func, &env)?;
        if log_enabled!(Level::Trace) {
            trace!("cranelift IR for `{symbol}`:\n{}", ctx.func.display());
        }

        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| JitError::Codegen(format!("{e:?}")))?;
        self.set_state(BackendState::Compiled);

        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| JitError::Codegen(format!("{e:?}")))?;

        Ok(module.get_finalized_function(func_id))
    }
}

impl Default for JitEngine {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl CompilationBackend for JitEngine {
    type Entry = NativeJoinFn;

    fn state(&self) -> BackendState {
        self.state
    }

    fn initialize(&mut self) -> Result<(), JitError> {
        if self.state != BackendState::Uninitialized {
            return Err(state_error("uninitialized", self.state));
        }
        let module = self.build_module()?;
        self.module = Some(module);
        self.live.store(true, Ordering::Release);
        self.set_state(BackendState::Initialized);
        Ok(())
    }

    fn compile(&mut self, func: &IrFunction) -> Result<NativeJoinFn, JitError> {
        if !self.state.accepts_compile() {
            return Err(state_error("initialized", self.state));
        }
        func.verify()?;
        if !has_join_signature(func) {
            return Err(JitError::Signature(format!(
                "`{}` has parameters {:?} -> {}",
                func.name(),
                func.param_types(),
                func.return_type()
            )));
        }

        let key = ir_hash(func);
        if let Some(&ptr) = self.cache.get(&key) {
            debug!("jit cache hit for `{}` ({key:x})", func.name());
            return Ok(NativeJoinFn {
                fn_ptr: ptr,
                live: Arc::clone(&self.live),
            });
        }

        let resume = self.state;
        let started = Instant::now();
        let Some(mut module) = self.module.take() else {
            return Err(state_error("initialized", self.state));
        };
        let result = self.emit(&mut module, func, key);
        self.module = Some(module);

        match result {
            Ok(ptr) => {
                self.cache.insert(key, ptr);
                self.set_state(BackendState::Invokable);
                info!(
                    "compiled `{}` in {:?}",
                    func.name(),
                    started.elapsed()
                );
                Ok(NativeJoinFn {
                    fn_ptr: ptr,
                    live: Arc::clone(&self.live),
                })
            }
            Err(e) => {
                self.set_state(resume);
                Err(e)
            }
        }
    }

    fn shutdown(&mut self) {
        if self.state == BackendState::Shutdown {
            return;
        }
        self.live.store(false, Ordering::Release);
        if let Some(module) = self.module.take() {
            // Safety: every entry handed out shares `live`, which is now
            // false, and the harness refuses to call dead entries.
            unsafe { module.free_memory() };
        }
        self.cache.clear();
        self.strings.clear();
        self.set_state(BackendState::Shutdown);
    }
}

impl Drop for JitEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Native signature of an IR function.
fn join_signature(module: &JITModule, func: &IrFunction) -> Signature {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    for ty in func.param_types() {
        sig.params.push(AbiParam::new(clif_type(ty, ptr_type)));
    }
    sig.returns
        .push(AbiParam::new(clif_type(func.return_type(), ptr_type)));
    sig
}

/// `jitjoin_str_eq(a: *const c_char, b: *const c_char) -> i32`
fn str_eq_signature(module: &JITModule) -> Signature {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_type)); // a
    sig.params.push(AbiParam::new(ptr_type)); // b
    sig.returns.push(AbiParam::new(types::I32)); // equal
    sig
}

/// Hash of the IR text, for cache lookup.
fn ir_hash(func: &IrFunction) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    func.to_string().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::config::JoinParams;
    use crate::ir::IrType;
    use crate::join_ir::build_join_ir;

    #[test]
    fn test_lifecycle_transitions() {
        let mut engine = JitEngine::default();
        assert_eq!(engine.state(), BackendState::Uninitialized);
        engine.initialize().unwrap();
        assert_eq!(engine.state(), BackendState::Initialized);

        let func = build_join_ir(&JoinParams::default()).unwrap();
        let entry = engine.compile(&func).unwrap();
        assert_eq!(engine.state(), BackendState::Invokable);
        assert!(entry.is_live());

        engine.shutdown();
        assert_eq!(engine.state(), BackendState::Shutdown);
        assert!(!entry.is_live());
    }

    #[test]
    fn test_compile_before_initialize_is_rejected() {
        let mut engine = JitEngine::default();
        let func = build_join_ir(&JoinParams::default()).unwrap();
        let err = engine.compile(&func).err().unwrap();
        assert!(matches!(
            err,
            JitError::State {
                found: "uninitialized",
                ..
            }
        ));
    }

    #[test]
    fn test_double_initialize_is_rejected() {
        let mut engine = JitEngine::default();
        engine.initialize().unwrap();
        assert!(engine.initialize().is_err());
    }

    #[test]
    fn test_wrong_signature_is_reported_and_recoverable() {
        let mut engine = JitEngine::default();
        engine.initialize().unwrap();

        let mut b = IrBuilder::new("not_a_join", IrType::I32);
        b.declare_parameter("n", IrType::I32).unwrap();
        let mut body = b.body();
        let n = body.load("n").unwrap();
        body.return_value(n).unwrap();
        let func = b.finish().unwrap();

        let err = engine.compile(&func).err().unwrap();
        assert!(matches!(err, JitError::Signature(_)));
        assert_eq!(err.exit_code(), -2);
        assert_eq!(engine.state(), BackendState::Initialized);

        let join = build_join_ir(&JoinParams::default()).unwrap();
        engine.compile(&join).unwrap();
    }

    #[test]
    fn test_same_ir_is_cached() {
        let mut engine = JitEngine::default();
        engine.initialize().unwrap();
        let func = build_join_ir(&JoinParams::default()).unwrap();
        let first = engine.compile(&func).unwrap();
        let second = engine.compile(&func).unwrap();
        assert_eq!(engine.cached_count(), 1);
        assert_eq!(first.as_fn_ptr(), second.as_fn_ptr());

        let other = build_join_ir(&JoinParams {
            not_found: "missing".into(),
            ..JoinParams::default()
        })
        .unwrap();
        engine.compile(&other).unwrap();
        assert_eq!(engine.cached_count(), 2);
    }
}
