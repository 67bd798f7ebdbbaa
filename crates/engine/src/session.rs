//! The session composition root.
//!
//! One `Session` owns the gateway, memory store, and engine for one
//! loaded story. Created at story load, disposed on reload; disposal
//! retires the engine and aborts every in-flight model call, so a
//! replaced session can never mutate anything after its successor
//! exists.

use std::sync::Arc;

use tw_domain::config::GatewayConfig;
use tw_domain::error::Result;
use tw_domain::events::EventSink;
use tw_domain::story::Story;
use tw_memory::{MemoryConfig, MemoryStore};
use tw_providers::ModelGateway;

use crate::engine::Engine;

/// Everything one playthrough needs, wired together.
pub struct Session {
    gateway: Arc<ModelGateway>,
    memory: Arc<MemoryStore>,
    engine: Arc<Engine>,
}

impl Session {
    /// Build a session around a story with a fresh, unconfigured gateway.
    pub fn new(story: Story, sink: Arc<dyn EventSink>) -> Arc<Self> {
        Self::with_gateway(story, Arc::new(ModelGateway::new()), sink, MemoryConfig::default())
    }

    /// Build a session around an existing gateway (tests, shared config).
    pub fn with_gateway(
        story: Story,
        gateway: Arc<ModelGateway>,
        sink: Arc<dyn EventSink>,
        memory_config: MemoryConfig,
    ) -> Arc<Self> {
        let story = Arc::new(story);
        let memory = MemoryStore::new(gateway.clone(), memory_config);
        let engine = Engine::new(story, gateway.clone(), memory.clone(), sink);
        Arc::new(Self {
            gateway,
            memory,
            engine,
        })
    }

    /// Configure (or reconfigure) the model provider.
    pub fn configure_provider(&self, config: GatewayConfig) -> Result<()> {
        self.gateway.configure(config)
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Tear the session down: abort in-flight calls and mark the engine
    /// retired so stragglers are discarded.
    pub fn dispose(&self) {
        self.engine.retire();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}
