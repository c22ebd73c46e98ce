//! The runtime container: engine, store, linker and the instantiated guest.

use anyhow::Context;
use tracing::info;
use wasmtime::{Instance, Linker, Module, Store, WasmParams, WasmResults};

use crate::abi::{self, GuestEntrypoints};
use crate::loader;
use crate::state::HostState;

struct Guest {
    instance: Instance,
    entrypoints: GuestEntrypoints,
}

/// Host-side runtime container.
pub struct NoxRuntime {
    engine: wasmtime::Engine,
    store: Store<HostState>,
    linker: Linker<HostState>,
    guest: Option<Guest>,
}

impl NoxRuntime {
    /// Create the engine and register every host import.
    pub fn new(state: HostState) -> Result<Self, anyhow::Error> {
        let mut cfg = wasmtime::Config::new();

        // Broadly supported features for modern toolchains.
        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);

        let engine = wasmtime::Engine::new(&cfg)?;
        let store = Store::new(&engine, state);
        let mut linker = Linker::new(&engine);
        super::imports::define_imports(&mut linker)?;

        Ok(Self {
            engine,
            store,
            linker,
            guest: None,
        })
    }

    /// Compile guest bytes (`.wasm` or `.wat`) and instantiate them.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
        let module = loader::compile_module(&self.engine, bytes)?;
        self.instantiate(&module)
    }

    /// Instantiate a compiled module and resolve its entrypoints.
    pub fn instantiate(&mut self, module: &Module) -> Result<(), anyhow::Error> {
        let instance = self
            .linker
            .instantiate(&mut self.store, module)
            .context("failed to instantiate guest")?;
        let entrypoints = GuestEntrypoints::resolve(&instance, &mut self.store)?;
        info!(
            init = entrypoints.init.is_some(),
            quit = entrypoints.quit.is_some(),
            "guest instantiated"
        );
        self.guest = Some(Guest {
            instance,
            entrypoints,
        });
        Ok(())
    }

    fn guest(&self) -> Result<&Guest, anyhow::Error> {
        self.guest
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no guest loaded"))
    }

    pub fn init(&mut self) -> Result<(), anyhow::Error> {
        if let Some(init) = self.guest()?.entrypoints.init.clone() {
            init.call(&mut self.store, ())
                .with_context(|| format!("guest `{}` failed", abi::guest_exports::INIT))?;
        }
        Ok(())
    }

    /// Run one guest frame.
    pub fn update(&mut self, dt: f32) -> Result<(), anyhow::Error> {
        let update = self.guest()?.entrypoints.update.clone();
        update
            .call(&mut self.store, dt)
            .with_context(|| format!("guest `{}` failed", abi::guest_exports::UPDATE))
    }

    pub fn quit(&mut self) -> Result<(), anyhow::Error> {
        if let Some(quit) = self.guest()?.entrypoints.quit.clone() {
            quit.call(&mut self.store, ())
                .with_context(|| format!("guest `{}` failed", abi::guest_exports::QUIT))?;
        }
        Ok(())
    }

    /// Call any other function the guest exports.
    pub fn call_export<Params, Results>(
        &mut self,
        name: &str,
        params: Params,
    ) -> Result<Results, anyhow::Error>
    where
        Params: WasmParams,
        Results: WasmResults,
    {
        let instance = self.guest()?.instance;
        let func = instance
            .get_typed_func::<Params, Results>(&mut self.store, name)
            .with_context(|| format!("guest export `{name}`"))?;
        func.call(&mut self.store, params)
            .with_context(|| format!("guest `{name}` failed"))
    }

    pub fn state(&self) -> &HostState {
        self.store.data()
    }

    pub fn state_mut(&mut self) -> &mut HostState {
        self.store.data_mut()
    }
}
